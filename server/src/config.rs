//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};

use switchboard_broker::BrokerKonfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Broker-Einstellungen (Herzschlag, Bestaetigungen, Ereignisse)
    pub broker: BrokerEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer die TCP/TLS-Verbindung
    pub bind_adresse: String,
    /// Port fuer die TCP/TLS-Verbindung
    pub port: u16,
    /// TLS-Zertifikat-Pfad (PEM; leer = Klartext-TCP)
    pub tls_zertifikat: Option<String>,
    /// TLS-Schluessel-Pfad (PEM)
    pub tls_schluessel: Option<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8222,
            tls_zertifikat: None,
            tls_schluessel: None,
        }
    }
}

/// Broker-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerEinstellungen {
    /// Maximale gleichzeitige Clients
    pub max_clients: u32,
    /// Sende-Bestaetigungen an Absender
    pub sende_bestaetigungen: bool,
    /// ServerJoin/ServerLeave-Ereignisse verteilen
    pub server_beitritt_ereignisse: bool,
    /// ChannelJoin/ChannelLeave-Ereignisse verteilen
    pub kanal_ereignisse: bool,
    /// Herzschlag-Intervall in Millisekunden (0 = aus, sonst >= 100)
    pub herzschlag_intervall_ms: u64,
    /// Raeumung nach so vielen Herzschlag-Fehlern in Folge
    pub herzschlag_max_fehler: u32,
    /// Frist fuer synchrone Anfragen in Millisekunden
    pub sync_timeout_ms: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for BrokerEinstellungen {
    fn default() -> Self {
        let basis = BrokerKonfig::default();
        Self {
            max_clients: basis.max_clients,
            sende_bestaetigungen: basis.sende_bestaetigungen,
            server_beitritt_ereignisse: basis.server_beitritt_ereignisse,
            kanal_ereignisse: basis.kanal_ereignisse,
            herzschlag_intervall_ms: basis.herzschlag_intervall_ms,
            herzschlag_max_fehler: basis.herzschlag_max_fehler,
            sync_timeout_ms: basis.sync_timeout_ms,
            max_frame_groesse: basis.max_frame_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Validiert die Konfiguration
    ///
    /// Herzschlag-Intervalle unter 100 ms (ausser 0 = aus) lehnt der
    /// Broker ab; TLS braucht Zertifikat UND Schluessel.
    pub fn pruefen(&self) -> anyhow::Result<()> {
        let intervall = self.broker.herzschlag_intervall_ms;
        if intervall > 0 && intervall < 100 {
            anyhow::bail!(
                "Herzschlag-Intervall {intervall} ms ist ungueltig (0 oder >= 100)"
            );
        }
        if self.netzwerk.tls_zertifikat.is_some() != self.netzwerk.tls_schluessel.is_some() {
            anyhow::bail!("TLS braucht Zertifikat und Schluessel gemeinsam");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Uebersetzt die Broker-Sektion in die Kern-Konfiguration
    pub fn broker_konfig(&self) -> BrokerKonfig {
        BrokerKonfig {
            max_clients: self.broker.max_clients,
            sende_bestaetigungen: self.broker.sende_bestaetigungen,
            server_beitritt_ereignisse: self.broker.server_beitritt_ereignisse,
            kanal_ereignisse: self.broker.kanal_ereignisse,
            herzschlag_intervall_ms: self.broker.herzschlag_intervall_ms,
            herzschlag_max_fehler: self.broker.herzschlag_max_fehler,
            sync_timeout_ms: self.broker.sync_timeout_ms,
            max_frame_groesse: self.broker.max_frame_groesse,
        }
    }
}
