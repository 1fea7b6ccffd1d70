//! TCP/TLS-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `BrokerServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer
//! `ClientConnection`. Mit konfiguriertem `TlsAcceptor` laeuft der
//! TLS-Handshake im Verbindungs-Task; Klartext und TLS teilen sich
//! denselben generischen Verbindungs-Code.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::broadcast::ClientSender;
use crate::error::BrokerResult;
use crate::registry::ClientRecord;
use crate::server_state::BrokerState;
use crate::verbindung::ClientConnection;

/// TCP/TLS-Broker-Server
///
/// Bindet einen TCP-Socket und akzeptiert Verbindungen in einer Loop.
pub struct BrokerServer {
    state: Arc<BrokerState>,
    bind_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
}

impl BrokerServer {
    /// Erstellt einen neuen BrokerServer (Klartext-TCP)
    pub fn neu(state: Arc<BrokerState>, bind_addr: SocketAddr) -> Self {
        Self {
            state,
            bind_addr,
            tls: None,
        }
    }

    /// Aktiviert TLS mit dem angegebenen Acceptor
    pub fn mit_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Gibt die konfigurierte Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Bindet den Socket und startet die Accept-Loop
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt. Beim
    /// Verlassen der Loop wird `server_gestoppt` gerufen.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> BrokerResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.starten_mit_listener(listener, shutdown_rx).await
    }

    /// Accept-Loop auf einem bereits gebundenen Listener
    ///
    /// Nuetzlich fuer Tests mit ephemerem Port (`127.0.0.1:0`).
    pub async fn starten_mit_listener(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> BrokerResult<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            tls = self.tls.is_some(),
            "Broker-Server gestartet"
        );
        self.state
            .rueckrufe
            .log_nachricht(&format!("Broker-Server auf {lokale_addr} gestartet"));

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.verbindung_annehmen(stream, peer_addr, shutdown_rx.clone());
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Broker-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Broker-Server gestoppt");
        self.state.rueckrufe.log_nachricht("Broker-Server gestoppt");
        self.state.rueckrufe.server_gestoppt();
        Ok(())
    }

    /// Registriert die Verbindung und startet ihren Task
    fn verbindung_annehmen(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        // Client-Limit pruefen BEVOR der TLS-Handshake Arbeit kostet
        let verbunden = self.state.registry.client_anzahl() as u32;
        if verbunden >= self.state.konfig.max_clients {
            tracing::warn!(
                peer = %peer_addr,
                max = self.state.konfig.max_clients,
                "Server voll – Verbindung abgelehnt"
            );
            drop(stream);
            return;
        }

        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

        let (sender, sende_rx) = ClientSender::neu(peer_addr);
        let record = ClientRecord::neu(peer_addr, sender);
        self.state.registry.client_hinzufuegen(record.clone());
        self.state.rueckrufe.client_verbunden(&record);

        let state = Arc::clone(&self.state);
        let tls = self.tls.clone();
        tokio::spawn(async move {
            let verbindung = ClientConnection::neu(Arc::clone(&state), peer_addr);
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        verbindung.verarbeiten(tls_stream, sende_rx, shutdown_rx).await;
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "TLS-Handshake fehlgeschlagen");
                        // Eintrag aus dem Accept-Schritt zuruecknehmen
                        state.registry.client_entfernen_nach_adresse(&peer_addr);
                    }
                },
                None => {
                    verbindung.verarbeiten(stream, sende_rx, shutdown_rx).await;
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rueckrufe::NoopRueckrufe;
    use crate::server_state::BrokerKonfig;
    use futures_util::{SinkExt, StreamExt};
    use switchboard_core::ClientGuid;
    use switchboard_protocol::{Befehl, Dekodiert, FrameCodec, Nachricht};
    use tokio_util::codec::Framed;

    async fn server_starten(konfig: BrokerKonfig) -> (SocketAddr, watch::Sender<bool>) {
        let state = BrokerState::neu(konfig, Arc::new(NoopRueckrufe));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = BrokerServer::neu(state, adresse);
        tokio::spawn(async move {
            let _ = server.starten_mit_listener(listener, shutdown_rx).await;
        });
        (adresse, shutdown_tx)
    }

    #[tokio::test]
    async fn verbindung_und_login_ueber_tcp() {
        let konfig = BrokerKonfig {
            herzschlag_intervall_ms: 0,
            ..BrokerKonfig::default()
        };
        let (adresse, _shutdown) = server_starten(konfig).await;

        let stream = TcpStream::connect(adresse).await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());

        let mut login = Nachricht::kommando(Befehl::Login);
        login.sender_guid = Some(ClientGuid::from("c1"));
        login.email = Some("c1@x".into());
        framed.send(login).await.unwrap();

        match framed.next().await {
            Some(Ok(Dekodiert::Nachricht(antwort))) => {
                assert_eq!(antwort.success, Some(true));
            }
            sonst => panic!("Login-Antwort erwartet, war: {sonst:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_stoppt_accept_loop() {
        let (adresse, shutdown) = server_starten(BrokerKonfig::default()).await;
        shutdown.send(true).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Neue Verbindungen werden nicht mehr angenommen; der Connect
        // selbst kann noch gelingen (Backlog), aber der Server liest nie.
        let _ = TcpStream::connect(adresse).await;
    }
}
