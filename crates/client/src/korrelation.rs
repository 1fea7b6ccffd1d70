//! Sync-Korrelator – Zuordnung von Anfragen zu Antworten
//!
//! Ein Client der eine synchrone Anfrage stellt, registriert ihre
//! `MessageId` und blockiert bis die passende Antwort eintrifft oder
//! die Frist ablaeuft. Zuordnung erfolgt ausschliesslich ueber die
//! `MessageId`; die Ankunftsreihenfolge anderer Nachrichten spielt
//! keine Rolle.
//!
//! Registrierungen werden im Speicher gehalten (HashMap mit
//! Erstellzeit). Ein Sweep-Task raeumt verwaiste Eintraege periodisch
//! ab – jede Registrierung ist spaetestens nach der doppelten Frist
//! wieder verschwunden.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, RwLock};

use switchboard_core::MessageId;
use switchboard_protocol::Nachricht;

use crate::error::{ClientError, ClientResult};

/// Eine offene synchrone Anfrage
struct Anmeldung {
    erstellt_am: DateTime<Utc>,
    tx: oneshot::Sender<Nachricht>,
}

/// Verwaltet die offenen synchronen Anfragen eines Clients
pub struct SyncKorrelator {
    anmeldungen: RwLock<HashMap<MessageId, Anmeldung>>,
    frist: Duration,
}

impl SyncKorrelator {
    /// Erstellt einen neuen Korrelator mit der angegebenen Frist
    pub fn neu(frist: Duration) -> Arc<Self> {
        Arc::new(Self {
            anmeldungen: RwLock::new(HashMap::new()),
            frist,
        })
    }

    /// Startet den Sweep-Task fuer diesen Korrelator
    ///
    /// Der Task laeuft bis er abgebrochen wird; der Aufrufer behaelt
    /// das Handle und beendet ihn beim Trennen der Verbindung.
    pub fn sweeper_starten(korrelator: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let klon = Arc::clone(korrelator);
        let intervall = korrelator.frist.max(Duration::from_millis(50));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(intervall).await;
                let entfernt = klon.abgelaufene_bereinigen().await;
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Verwaiste Sync-Anfragen bereinigt");
                }
            }
        })
    }

    /// Gibt die konfigurierte Frist zurueck
    pub fn frist(&self) -> Duration {
        self.frist
    }

    /// Registriert eine offene Anfrage
    ///
    /// Schlaegt fehl wenn die `MessageId` bereits registriert ist.
    /// Gibt die Empfangsseite zurueck auf der [`warten`](Self::warten)
    /// die Antwort entgegennimmt.
    pub async fn registrieren(
        &self,
        id: MessageId,
    ) -> ClientResult<oneshot::Receiver<Nachricht>> {
        let mut anmeldungen = self.anmeldungen.write().await;
        if anmeldungen.contains_key(&id) {
            return Err(ClientError::DoppelteAnfrage(id));
        }
        let (tx, rx) = oneshot::channel();
        anmeldungen.insert(
            id,
            Anmeldung {
                erstellt_am: Utc::now(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Stellt eine eingetroffene Sync-Antwort ihrem Warter zu
    ///
    /// Gibt `None` zurueck wenn die Antwort zugestellt wurde. Gibt die
    /// Nachricht zurueck wenn keine Anfrage registriert war – der
    /// Aufrufer nimmt dann den asynchronen Zustellweg (eine
    /// unaufgeforderte Sync-Antwort ist kein Fehler).
    pub async fn zustellen(&self, nachricht: Nachricht) -> Option<Nachricht> {
        let Some(id) = nachricht.message_id.clone() else {
            return Some(nachricht);
        };
        let anmeldung = {
            let mut anmeldungen = self.anmeldungen.write().await;
            anmeldungen.remove(&id)
        };
        match anmeldung {
            Some(anmeldung) => {
                // Send schlaegt fehl wenn der Warter schon aufgegeben hat
                if anmeldung.tx.send(nachricht).is_err() {
                    tracing::debug!(id = %id, "Antwort ohne Warter verworfen");
                }
                None
            }
            None => Some(nachricht),
        }
    }

    /// Wartet auf die Antwort zu einer registrierten Anfrage
    ///
    /// Laeuft die Frist ab, wird die Registrierung entfernt und
    /// `Zeitlimit` gemeldet.
    pub async fn warten(
        &self,
        id: &MessageId,
        rx: oneshot::Receiver<Nachricht>,
    ) -> ClientResult<Nachricht> {
        match tokio::time::timeout(self.frist, rx).await {
            Ok(Ok(nachricht)) => Ok(nachricht),
            Ok(Err(_)) => {
                // Sender weg ohne Antwort (Korrelator bereinigt)
                Err(ClientError::Getrennt)
            }
            Err(_) => {
                self.anmeldungen.write().await.remove(id);
                Err(ClientError::Zeitlimit(id.clone()))
            }
        }
    }

    /// Entfernt Registrierungen deren Frist abgelaufen ist
    pub async fn abgelaufene_bereinigen(&self) -> usize {
        let frist = chrono::Duration::from_std(self.frist).unwrap_or(chrono::Duration::zero());
        let jetzt = Utc::now();
        let mut anmeldungen = self.anmeldungen.write().await;
        let vorher = anmeldungen.len();
        anmeldungen.retain(|_, a| jetzt - a.erstellt_am <= frist);
        vorher - anmeldungen.len()
    }

    /// Anzahl der offenen Anfragen
    pub async fn offen(&self) -> usize {
        self.anmeldungen.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
