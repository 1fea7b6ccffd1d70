//! Channel-Handler – Join, Leave, Create, Delete, Listen
//!
//! Alle Kanal-Operationen setzen eine angemeldete Verbindung voraus
//! (das Login-Gate sitzt im Verbindungs-Task). Loeschen darf nur der
//! Besitzer; verlaesst der Besitzer seinen Kanal, wird der Kanal
//! entfernt und die uebrigen Abonnenten werden benachrichtigt.

use std::sync::Arc;

use serde_json::Value;
use switchboard_core::{ChannelGuid, ClientGuid};
use switchboard_protocol::{status, ClientInfo, KanalAnfrage, KanalInfo, Nachricht};

use crate::dispatcher::DispatcherKontext;
use crate::ereignis;
use crate::registry::KanalRecord;
use crate::server_state::BrokerState;

/// Kennung des Anfragenden aus dem Kontext (Gate garantiert Anmeldung)
fn absender(ctx: &DispatcherKontext, anfrage: &Nachricht) -> Option<ClientGuid> {
    anfrage
        .sender_guid
        .clone()
        .filter(|g| !g.ist_leer())
        .or_else(|| ctx.guid.clone())
}

/// Verarbeitet JoinChannel
pub async fn beitreten(
    anfrage: Nachricht,
    ctx: &mut DispatcherKontext,
    state: &Arc<BrokerState>,
) -> Nachricht {
    let Some(guid) = absender(ctx, &anfrage) else {
        return Nachricht::fehler_antwort(&anfrage, status::BEITRITT_FEHLER);
    };
    let Some(kanal_guid) = anfrage.channel_guid.clone() else {
        return Nachricht::fehler_antwort(&anfrage, status::BEITRITT_FEHLER);
    };

    match state
        .registry
        .kanal_abonnent_hinzufuegen(&kanal_guid, guid.clone())
    {
        None => Nachricht::fehler_antwort(&anfrage, status::KANAL_NICHT_GEFUNDEN),
        Some(neu) => {
            if neu {
                tracing::info!(guid = %guid, kanal = %kanal_guid, "Kanal beigetreten");
                ereignis::kanal_beitritt_melden(state, &kanal_guid, &guid);
            }
            // Doppelter Beitritt bleibt eine einzelne Mitgliedschaft
            Nachricht::antwort_auf(
                &anfrage,
                true,
                Some(Value::String(status::BEITRITT_ERFOLG.to_string())),
            )
        }
    }
}

/// Verarbeitet LeaveChannel
///
/// Verlaesst der Besitzer den Kanal, wird der Kanal geloescht und die
/// uebrigen Abonnenten erhalten die Loeschungs-Benachrichtigung.
pub async fn verlassen(
    anfrage: Nachricht,
    ctx: &mut DispatcherKontext,
    state: &Arc<BrokerState>,
) -> Nachricht {
    let Some(guid) = absender(ctx, &anfrage) else {
        return Nachricht::fehler_antwort(&anfrage, status::AUSTRITT_FEHLER);
    };
    let Some(kanal_guid) = anfrage.channel_guid.clone() else {
        return Nachricht::fehler_antwort(&anfrage, status::AUSTRITT_FEHLER);
    };

    let Some(kanal) = state.registry.kanal_nach_guid(&kanal_guid) else {
        return Nachricht::fehler_antwort(&anfrage, status::KANAL_NICHT_GEFUNDEN);
    };

    if kanal.besitzer == guid {
        // Besitzer geht – Kanal wird aufgeloest
        match state.registry.kanal_entfernen(&kanal_guid) {
            Some((record, andere)) => {
                tracing::info!(guid = %guid, kanal = %kanal_guid, "Besitzer verlaesst – Kanal entfernt");
                ereignis::kanal_loeschung_melden(state, &record, &andere);
                Nachricht::antwort_auf(
                    &anfrage,
                    true,
                    Some(Value::String(status::LOESCHEN_ERFOLG.to_string())),
                )
            }
            None => Nachricht::fehler_antwort(&anfrage, status::KANAL_NICHT_GEFUNDEN),
        }
    } else {
        match state.registry.kanal_abonnent_entfernen(&kanal_guid, &guid) {
            Some(true) => {
                tracing::info!(guid = %guid, kanal = %kanal_guid, "Kanal verlassen");
                ereignis::kanal_austritt_melden(state, &kanal_guid, &guid);
                Nachricht::antwort_auf(
                    &anfrage,
                    true,
                    Some(Value::String(status::AUSTRITT_ERFOLG.to_string())),
                )
            }
            // War kein Abonnent (z.B. doppeltes Verlassen)
            Some(false) => Nachricht::fehler_antwort(&anfrage, status::AUSTRITT_FEHLER),
            None => Nachricht::fehler_antwort(&anfrage, status::KANAL_NICHT_GEFUNDEN),
        }
    }
}

/// Verarbeitet CreateChannel
///
/// Name und Privat-Flag stecken als [`KanalAnfrage`] im `Data`-Feld;
/// die Kanal-Kennung kommt vom Client oder wird vergeben. Namens-
/// Kollisionen (ohne Gross-/Kleinschreibung) werden hier geprueft,
/// Kennungs-Kollisionen in der Registry.
pub async fn erstellen(
    anfrage: Nachricht,
    ctx: &mut DispatcherKontext,
    state: &Arc<BrokerState>,
) -> Nachricht {
    let Some(guid) = absender(ctx, &anfrage) else {
        return Nachricht::fehler_antwort(&anfrage, status::ERSTELLEN_FEHLER);
    };

    let kanal_anfrage: KanalAnfrage = match anfrage
        .data
        .clone()
        .and_then(|v| serde_json::from_value(v).ok())
    {
        Some(a) => a,
        None => return Nachricht::fehler_antwort(&anfrage, status::ERSTELLEN_FEHLER),
    };

    if kanal_anfrage.channel_name.is_empty() {
        return Nachricht::fehler_antwort(&anfrage, status::ERSTELLEN_FEHLER);
    }

    if state
        .registry
        .kanal_nach_name(&kanal_anfrage.channel_name)
        .is_some()
    {
        return Nachricht::fehler_antwort(&anfrage, status::BEREITS_VORHANDEN);
    }

    let kanal_guid: ChannelGuid = anfrage.channel_guid.clone().unwrap_or_default();
    let record = KanalRecord::neu(
        kanal_guid.clone(),
        kanal_anfrage.channel_name.clone(),
        guid.clone(),
        kanal_anfrage.private,
    );

    if !state.registry.kanal_hinzufuegen(guid.clone(), record) {
        return Nachricht::fehler_antwort(&anfrage, status::BEREITS_VORHANDEN);
    }

    tracing::info!(
        guid = %guid,
        kanal = %kanal_guid,
        name = %kanal_anfrage.channel_name,
        privat = kanal_anfrage.private,
        "Kanal erstellt"
    );

    let mut antwort = Nachricht::antwort_auf(
        &anfrage,
        true,
        Some(Value::String(status::ERSTELLEN_ERFOLG.to_string())),
    );
    // Hatte die Anfrage keine Kennung, traegt die Antwort die vergebene
    antwort.channel_guid = Some(kanal_guid);
    antwort
}

/// Verarbeitet DeleteChannel (nur durch den Besitzer)
pub async fn loeschen(
    anfrage: Nachricht,
    ctx: &mut DispatcherKontext,
    state: &Arc<BrokerState>,
) -> Nachricht {
    let Some(guid) = absender(ctx, &anfrage) else {
        return Nachricht::fehler_antwort(&anfrage, status::LOESCHEN_FEHLER);
    };
    let Some(kanal_guid) = anfrage.channel_guid.clone() else {
        return Nachricht::fehler_antwort(&anfrage, status::LOESCHEN_FEHLER);
    };

    let Some(kanal) = state.registry.kanal_nach_guid(&kanal_guid) else {
        return Nachricht::fehler_antwort(&anfrage, status::KANAL_NICHT_GEFUNDEN);
    };

    // Loeschen durch Fremde ist immer ein Fehlschlag
    if kanal.besitzer != guid {
        tracing::debug!(guid = %guid, kanal = %kanal_guid, "Loeschversuch durch Nicht-Besitzer");
        return Nachricht::fehler_antwort(&anfrage, status::LOESCHEN_FEHLER);
    }

    match state.registry.kanal_entfernen(&kanal_guid) {
        Some((record, andere)) => {
            tracing::info!(guid = %guid, kanal = %kanal_guid, "Kanal geloescht");
            ereignis::kanal_loeschung_melden(state, &record, &andere);
            Nachricht::antwort_auf(
                &anfrage,
                true,
                Some(Value::String(status::LOESCHEN_ERFOLG.to_string())),
            )
        }
        None => Nachricht::fehler_antwort(&anfrage, status::KANAL_NICHT_GEFUNDEN),
    }
}

/// Verarbeitet ListChannels
///
/// Private Kanaele erscheinen nur in der Liste ihres Besitzers.
pub async fn auflisten(
    anfrage: Nachricht,
    ctx: &mut DispatcherKontext,
    state: &Arc<BrokerState>,
) -> Nachricht {
    let guid = absender(ctx, &anfrage);

    let kanaele: Vec<KanalInfo> = state
        .registry
        .alle_kanaele()
        .into_iter()
        .filter(|k| !k.privat || Some(&k.besitzer) == guid.as_ref())
        .map(|k| KanalInfo {
            channel_guid: k.guid.clone(),
            channel_name: k.name.clone(),
            owner_guid: k.besitzer.clone(),
            private: k.privat,
            subscriber_count: k.abonnenten.len(),
        })
        .collect();

    let data = serde_json::to_value(kanaele).unwrap_or(Value::Array(vec![]));
    Nachricht::antwort_auf(&anfrage, true, Some(data))
}

/// Verarbeitet ListChannelSubscribers
///
/// Die Eintraege sind bereinigt: Kennung, E-Mail und Verbindungszeit,
/// keine Zugangsdaten und kein Transport-Zustand. Ein unbekannter
/// Kanal ergibt eine leere Liste.
pub async fn abonnenten_auflisten(anfrage: Nachricht, state: &Arc<BrokerState>) -> Nachricht {
    let abonnenten: Vec<ClientInfo> = anfrage
        .channel_guid
        .as_ref()
        .and_then(|kanal_guid| state.registry.kanal_abonnenten(kanal_guid))
        .unwrap_or_default()
        .into_iter()
        .map(|guid| {
            let record = state.registry.client_nach_guid(&guid);
            ClientInfo {
                client_guid: guid,
                email: record.as_ref().and_then(|r| r.email.clone()),
                created_utc: record.map(|r| r.erstellt_am),
            }
        })
        .collect();

    let data = serde_json::to_value(abonnenten).unwrap_or(Value::Array(vec![]));
    Nachricht::antwort_auf(&anfrage, true, Some(data))
}
