//! Client-Handler – ListClients und IsClientConnected
//!
//! Listen-Antworten sind bereinigt: Kennung, E-Mail und Verbindungszeit,
//! niemals Zugangsdaten oder Transport-Zustand.

use std::sync::Arc;

use serde_json::Value;
use switchboard_core::ClientGuid;
use switchboard_protocol::{status, ClientInfo, Nachricht};

use crate::server_state::BrokerState;

/// Verarbeitet ListClients: alle angemeldeten Clients, bereinigt
pub async fn auflisten(anfrage: Nachricht, state: &Arc<BrokerState>) -> Nachricht {
    let clients: Vec<ClientInfo> = state
        .registry
        .alle_clients()
        .into_iter()
        .filter(|record| record.angemeldet)
        .filter_map(|record| {
            record.guid.clone().map(|guid| ClientInfo {
                client_guid: guid,
                email: record.email.clone(),
                created_utc: Some(record.erstellt_am),
            })
        })
        .collect();

    let data = serde_json::to_value(clients).unwrap_or(Value::Array(vec![]));
    Nachricht::antwort_auf(&anfrage, true, Some(data))
}

/// Verarbeitet IsClientConnected: Kennung im `Data`-Feld, Antwort ist ein Bool
pub async fn ist_verbunden(anfrage: Nachricht, state: &Arc<BrokerState>) -> Nachricht {
    let ziel = match anfrage.data.as_ref().and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => ClientGuid::from(s),
        _ => return Nachricht::fehler_antwort(&anfrage, status::UNGUELTIGE_NACHRICHT),
    };

    let verbunden = state.registry.ist_client_verbunden(&ziel);
    Nachricht::antwort_auf(&anfrage, true, Some(Value::Bool(verbunden)))
}
