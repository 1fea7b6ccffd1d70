//! Send-Queues der verbundenen Clients
//!
//! Jede Verbindung besitzt genau eine Send-Queue. Der Verbindungs-Task
//! liest aus der Queue und schreibt auf den Socket; alle anderen Tasks
//! schreiben nur indirekt ueber den `ClientSender`. Damit verzahnen
//! sich Schreibzugriffe auf einen Peer nie auf der Leitung.

use std::net::SocketAddr;
use tokio::sync::mpsc;

use switchboard_protocol::Nachricht;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Client
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
///
/// Der Handle ist der "Transport-Griff" der im Registry-Record steckt:
/// er ist klonbar, nicht-blockierend verwendbar und ueberlebt den
/// eigentlichen Socket nicht (Queue geschlossen = Peer weg).
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub adresse: SocketAddr,
    tx: mpsc::Sender<Nachricht>,
}

impl ClientSender {
    /// Erstellt eine neue Send-Queue und gibt Handle + Empfangsseite zurueck
    ///
    /// Die `ClientConnection` liest aus der Empfangsseite und schreibt via TCP.
    pub fn neu(adresse: SocketAddr) -> (Self, mpsc::Receiver<Nachricht>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        (Self { adresse, tx }, rx)
    }

    /// Reiht eine Nachricht nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: Nachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(adresse = %self.adresse, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(adresse = %self.adresse, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Reiht eine Nachricht wartend ein (fuer eigenstaendige Sende-Tasks)
    pub async fn senden_warten(&self, nachricht: Nachricht) -> bool {
        self.tx.send(nachricht).await.is_ok()
    }

    /// Nicht-blockierende Lebendigkeits-Sonde
    ///
    /// `false` sobald der Verbindungs-Task die Empfangsseite fallen
    /// gelassen hat (Peer halb geschlossen oder geraeumt).
    pub fn ist_lebendig(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Stellt eine Nachricht als eigenstaendig eingeplante Sendung zu
///
/// Jede Zustellung ist eine eigene Arbeitseinheit: der Aufrufer blockiert
/// nicht, und ein Fehlschlag bei einem Empfaenger beruehrt keinen anderen.
pub fn unabhaengig_senden(sender: ClientSender, nachricht: Nachricht) {
    tokio::spawn(async move {
        if !sender.senden_warten(nachricht).await {
            tracing::debug!(
                adresse = %sender.adresse,
                "Unabhaengige Zustellung fehlgeschlagen (Queue geschlossen)"
            );
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::MessageId;
    use switchboard_protocol::Befehl;

    fn test_adresse() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn test_nachricht(id: &str) -> Nachricht {
        let mut n = Nachricht::kommando(Befehl::Echo);
        n.message_id = Some(MessageId::from(id));
        n
    }

    #[tokio::test]
    async fn senden_und_empfangen() {
        let (sender, mut rx) = ClientSender::neu(test_adresse());
        assert!(sender.ist_lebendig());

        assert!(sender.senden(test_nachricht("m1")));
        let empfangen = rx.recv().await.expect("Nachricht erwartet");
        assert_eq!(empfangen.message_id.unwrap().as_str(), "m1");
    }

    #[tokio::test]
    async fn senden_an_geschlossene_queue() {
        let (sender, rx) = ClientSender::neu(test_adresse());
        drop(rx);
        assert!(!sender.ist_lebendig());
        assert!(!sender.senden(test_nachricht("m1")));
    }

    #[tokio::test]
    async fn volle_queue_verwirft() {
        let (sender, mut rx) = ClientSender::neu(test_adresse());
        for i in 0..SEND_QUEUE_GROESSE {
            assert!(sender.senden(test_nachricht(&format!("m{i}"))));
        }
        // Queue ist voll, naechste Nachricht wird verworfen
        assert!(!sender.senden(test_nachricht("ueberlauf")));

        // Nach dem Abfluss geht es weiter
        let _ = rx.recv().await;
        assert!(sender.senden(test_nachricht("nachzuegler")));
    }

    #[tokio::test]
    async fn unabhaengige_zustellung() {
        let (sender, mut rx) = ClientSender::neu(test_adresse());
        unabhaengig_senden(sender, test_nachricht("m7"));
        let empfangen = rx.recv().await.expect("Nachricht erwartet");
        assert_eq!(empfangen.message_id.unwrap().as_str(), "m7");
    }
}
