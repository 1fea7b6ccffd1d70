//! switchboard-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, TLS-Material und den Broker-Kern zu einem
//! lauffaehigen Server und stellt den Einstiegspunkt fuer
//! Integrationstests bereit.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use switchboard_broker::{BrokerRueckrufe, BrokerServer, BrokerState, NoopRueckrufe};

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    rueckrufe: Arc<dyn BrokerRueckrufe>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self {
            config,
            rueckrufe: Arc::new(NoopRueckrufe),
        }
    }

    /// Setzt die Rueckrufe der einbettenden Anwendung
    pub fn mit_rueckrufen(mut self, rueckrufe: Arc<dyn BrokerRueckrufe>) -> Self {
        self.rueckrufe = rueckrufe;
        self
    }

    /// Startet den Broker und laeuft bis zum Shutdown-Signal (Ctrl-C)
    ///
    /// Reihenfolge:
    /// 1. Broker-Zustand aufbauen
    /// 2. TLS-Material laden falls konfiguriert
    /// 3. TCP/TLS-Listener starten
    /// 4. Auf Ctrl-C / SIGTERM warten, dann alle Verbindungen trennen
    pub async fn starten(self) -> Result<()> {
        let bind_adresse: std::net::SocketAddr = self
            .config
            .bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.config.bind_adresse()))?;

        tracing::info!(
            adresse = %bind_adresse,
            tls = self.config.netzwerk.tls_zertifikat.is_some(),
            herzschlag_ms = self.config.broker.herzschlag_intervall_ms,
            "Server startet"
        );

        let state = BrokerState::neu(self.config.broker_konfig(), Arc::clone(&self.rueckrufe));

        let mut broker = BrokerServer::neu(Arc::clone(&state), bind_adresse);
        if let (Some(zertifikat), Some(schluessel)) = (
            &self.config.netzwerk.tls_zertifikat,
            &self.config.netzwerk.tls_schluessel,
        ) {
            let acceptor = tls_acceptor_laden(zertifikat, schluessel)?;
            broker = broker.mit_tls(acceptor);
            tracing::info!(zertifikat = %zertifikat, "TLS aktiviert");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Ctrl-C loest das Shutdown-Signal aus
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
            }
        });

        broker
            .starten(shutdown_rx)
            .await
            .context("Broker-Server beendet sich mit Fehler")?;

        Ok(())
    }
}

/// Laedt Zertifikatskette und privaten Schluessel aus PEM-Dateien
///
/// # Fehler
/// Wenn eine Datei fehlt, kein PEM ist oder keinen Schluessel enthaelt.
pub fn tls_acceptor_laden(zertifikat_pfad: &str, schluessel_pfad: &str) -> Result<TlsAcceptor> {
    let zertifikat_pem = std::fs::read(zertifikat_pfad)
        .with_context(|| format!("TLS-Zertifikat '{zertifikat_pfad}' nicht lesbar"))?;
    let schluessel_pem = std::fs::read(schluessel_pfad)
        .with_context(|| format!("TLS-Schluessel '{schluessel_pfad}' nicht lesbar"))?;

    let zertifikate: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut zertifikat_pem.as_slice())
            .collect::<std::result::Result<_, _>>()
            .context("Zertifikatskette nicht parsbar")?;
    if zertifikate.is_empty() {
        anyhow::bail!("'{zertifikat_pfad}' enthaelt kein Zertifikat");
    }

    let schluessel: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut schluessel_pem.as_slice())
            .context("Schluessel nicht parsbar")?
            .ok_or_else(|| anyhow::anyhow!("'{schluessel_pfad}' enthaelt keinen Schluessel"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(zertifikate, schluessel)
        .context("TLS-Konfiguration ungueltig")?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehlende_tls_dateien_melden_fehler() {
        let fehler = tls_acceptor_laden("/gibt/es/nicht.pem", "/auch/nicht.pem");
        assert!(fehler.is_err());
    }
}
