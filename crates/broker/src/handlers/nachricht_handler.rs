//! Nachricht-Handler – Direkt-Zustellung und Kanal-Fan-out
//!
//! Nutzlast-Nachrichten (ohne Kommando) werden anhand ihres Ziels
//! geroutet: `RecipientGuid` fuehrt zur Direkt-Zustellung an genau
//! einen Client, `ChannelGuid` zum Fan-out an alle Abonnenten des
//! Kanals ausser dem Absender. Jede weitergereichte Kopie ist
//! bereinigt (keine Zugangsdaten).
//!
//! Bestaetigungen: synchroner Verkehr (SyncRequest/SyncResponse)
//! bekommt nie eine Bestaetigung – die Antwort des Gegenuebers IST die
//! Antwort. Asynchroner Verkehr bekommt send-success/send-failure wenn
//! Bestaetigungen konfiguriert sind.

use std::sync::Arc;

use serde_json::Value;
use switchboard_core::{ChannelGuid, ClientGuid};
use switchboard_protocol::{status, Nachricht};

use crate::broadcast::unabhaengig_senden;
use crate::server_state::BrokerState;

/// Routet eine Nutzlast-Nachricht an ihr Ziel
pub async fn weiterleiten(anfrage: Nachricht, state: &Arc<BrokerState>) -> Option<Nachricht> {
    if let Some(empfaenger) = anfrage.recipient_guid.clone() {
        privat_senden(anfrage, empfaenger, state).await
    } else if let Some(kanal) = anfrage.channel_guid.clone() {
        kanal_senden(anfrage, kanal, state).await
    } else {
        Some(Nachricht::fehler_antwort(
            &anfrage,
            status::EMPFAENGER_NICHT_GEFUNDEN,
        ))
    }
}

/// Direkt-Zustellung an einen einzelnen Client
async fn privat_senden(
    anfrage: Nachricht,
    empfaenger: ClientGuid,
    state: &Arc<BrokerState>,
) -> Option<Nachricht> {
    let Some(sender) = state.registry.sender_nach_guid(&empfaenger) else {
        return Some(Nachricht::fehler_antwort(
            &anfrage,
            status::EMPFAENGER_NICHT_GEFUNDEN,
        ));
    };

    let kopie = anfrage.clone().bereinigt();
    let eingereiht = sender.senden(kopie);

    // Synchroner Verkehr laeuft ohne Bestaetigung
    if anfrage.sync_request || anfrage.sync_response {
        if !eingereiht {
            tracing::debug!(empfaenger = %empfaenger, "Sync-Zustellung fehlgeschlagen");
        }
        return None;
    }

    if !state.konfig.sende_bestaetigungen {
        return None;
    }

    if eingereiht {
        Some(Nachricht::antwort_auf(
            &anfrage,
            true,
            Some(Value::String(status::SENDE_ERFOLG.to_string())),
        ))
    } else {
        Some(Nachricht::fehler_antwort(&anfrage, status::SENDE_FEHLER))
    }
}

/// Fan-out an alle Abonnenten eines Kanals
///
/// Der Absender muss selbst Abonnent sein. Jeder Empfaenger bekommt
/// seine eigene, unabhaengig eingeplante Sendung; die Bestaetigung an
/// den Absender bezieht sich auf das Einplanen, nicht auf die einzelnen
/// Zustellungen.
async fn kanal_senden(
    anfrage: Nachricht,
    kanal_guid: ChannelGuid,
    state: &Arc<BrokerState>,
) -> Option<Nachricht> {
    let absender = anfrage.sender_guid.clone()?;

    let Some(abonnenten) = state.registry.kanal_abonnenten(&kanal_guid) else {
        return Some(Nachricht::fehler_antwort(
            &anfrage,
            status::EMPFAENGER_NICHT_GEFUNDEN,
        ));
    };

    if !abonnenten.contains(&absender) {
        return Some(Nachricht::fehler_antwort(
            &anfrage,
            status::KEIN_KANAL_MITGLIED,
        ));
    }

    let kopie = anfrage.clone().bereinigt();
    let mut eingeplant = 0usize;
    for abonnent in abonnenten.into_iter().filter(|g| *g != absender) {
        match state.registry.sender_nach_guid(&abonnent) {
            Some(sender) => {
                unabhaengig_senden(sender, kopie.clone());
                eingeplant += 1;
            }
            None => {
                tracing::debug!(abonnent = %abonnent, "Fan-out-Ziel nicht (mehr) verbunden");
            }
        }
    }

    tracing::debug!(
        kanal = %kanal_guid,
        absender = %absender,
        eingeplant,
        "Kanal-Fan-out eingeplant"
    );

    if anfrage.sync_request || anfrage.sync_response || !state.konfig.sende_bestaetigungen {
        return None;
    }

    // Auch ein Kanal ohne andere Abonnenten ist ein erfolgreiches Senden
    Some(Nachricht::antwort_auf(
        &anfrage,
        true,
        Some(Value::String(status::SENDE_ERFOLG.to_string())),
    ))
}
