//! Auth-Handler – Login und Echo
//!
//! Der Login bestaetigt (oder vergibt) die Client-Kennung und setzt
//! das Anmelde-Flag im Registry-Record. Echo dient als Diagnose:
//! die Anfrage kommt bereinigt und mit getauschten Rollen zurueck.

use std::sync::Arc;

use serde_json::Value;
use switchboard_core::ClientGuid;
use switchboard_protocol::{status, Nachricht};

use crate::dispatcher::DispatcherKontext;
use crate::server_state::BrokerState;

/// Verarbeitet das Login-Kommando
///
/// Die Kennung kommt vom Client (`SenderGuid`); fehlt sie, vergibt der
/// Server eine neue. Die Antwort geht VOR den Beitritts-Ereignissen
/// raus – der Verbindungs-Task wertet dafuer `frisch_angemeldet` aus.
pub async fn login(
    anfrage: Nachricht,
    ctx: &mut DispatcherKontext,
    state: &Arc<BrokerState>,
) -> Nachricht {
    let guid = match &anfrage.sender_guid {
        Some(guid) if !guid.ist_leer() && !guid.ist_server() => guid.clone(),
        Some(guid) if guid.ist_server() => {
            tracing::warn!(adresse = %ctx.adresse, "Login mit Server-Kennung abgelehnt");
            return Nachricht::fehler_antwort(&anfrage, status::LOGIN_FEHLER);
        }
        _ => ClientGuid::new(),
    };

    let record = match state
        .registry
        .client_aktualisieren(&ctx.adresse, guid.clone(), anfrage.email.clone())
    {
        Some(record) => record,
        None => {
            // Verbindung ist nicht (mehr) eingetragen – Wettlauf mit der Raeumung
            tracing::warn!(adresse = %ctx.adresse, "Login fuer unbekannte Verbindung");
            return Nachricht::fehler_antwort(&anfrage, status::LOGIN_FEHLER);
        }
    };

    ctx.guid = Some(guid.clone());
    ctx.frisch_angemeldet = true;

    tracing::info!(
        guid = %guid,
        email = record.email.as_deref().unwrap_or("-"),
        adresse = %ctx.adresse,
        "Client angemeldet"
    );

    let mut antwort = Nachricht::antwort_auf(
        &anfrage,
        true,
        Some(Value::String(status::LOGIN_ERFOLG.to_string())),
    );
    // Hatte die Anfrage keine Kennung, traegt die Antwort die vergebene
    antwort.recipient_guid = Some(guid);
    antwort
}

/// Verarbeitet das Echo-Kommando
///
/// Die Antwort ist eine Kopie der Anfrage: bereinigt, mit dem Server
/// als Absender, dem urspruenglichen Absender als Empfaenger und
/// unveraenderter Nutzlast.
pub fn echo(anfrage: Nachricht) -> Nachricht {
    let mut antwort = Nachricht::antwort_auf(&anfrage, true, anfrage.data.clone());
    antwort.command = anfrage.command.clone();
    antwort
}
