//! Ereignis-Verteilung – systemgenerierte Benachrichtigungen
//!
//! Der Broker erzeugt server-eigene Nachrichten fuer Beitritt und
//! Austritt auf Server- und Kanal-Ebene sowie fuer vom Besitzer
//! geloeschte Kanaele. Jeder Empfaenger bekommt seine eigene,
//! unabhaengig eingeplante Sendung; ein Fehlschlag bei einem Empfaenger
//! blockiert keinen anderen.
//!
//! Die Join/Leave-Ereignisse stehen unter Konfigurations-Flags; die
//! Loeschungs-Benachrichtigung ist eine Korrektheits-Meldung und wird
//! immer verschickt.

use std::sync::Arc;

use switchboard_core::{ChannelGuid, ClientGuid};
use switchboard_protocol::{EreignisTyp, Nachricht};

use crate::broadcast::unabhaengig_senden;
use crate::registry::KanalRecord;
use crate::server_state::BrokerState;

/// Meldet den Server-Beitritt eines Clients an alle anderen Angemeldeten
pub fn server_beitritt_melden(state: &Arc<BrokerState>, betreff: &ClientGuid) {
    if !state.konfig.server_beitritt_ereignisse {
        return;
    }
    an_alle_anderen(state, betreff, EreignisTyp::ClientJoinedServer, None);
}

/// Meldet den Server-Austritt eines Clients an alle anderen Angemeldeten
pub fn server_austritt_melden(state: &Arc<BrokerState>, betreff: &ClientGuid) {
    if !state.konfig.server_beitritt_ereignisse {
        return;
    }
    an_alle_anderen(state, betreff, EreignisTyp::ClientLeftServer, None);
}

/// Meldet einen Kanal-Beitritt an die uebrigen Abonnenten
pub fn kanal_beitritt_melden(state: &Arc<BrokerState>, kanal: &ChannelGuid, betreff: &ClientGuid) {
    if !state.konfig.kanal_ereignisse {
        return;
    }
    an_andere_abonnenten(state, kanal, betreff, EreignisTyp::ClientJoinedChannel);
}

/// Meldet einen Kanal-Austritt an die uebrigen Abonnenten
pub fn kanal_austritt_melden(state: &Arc<BrokerState>, kanal: &ChannelGuid, betreff: &ClientGuid) {
    if !state.konfig.kanal_ereignisse {
        return;
    }
    an_andere_abonnenten(state, kanal, betreff, EreignisTyp::ClientLeftChannel);
}

/// Meldet die Loeschung eines Kanals an dessen uebrige Abonnenten
///
/// Wird immer verschickt, unabhaengig von den Ereignis-Flags: ohne
/// diese Meldung wuerden Abonnenten weiter in einen toten Kanal senden.
pub fn kanal_loeschung_melden(state: &Arc<BrokerState>, kanal: &KanalRecord, andere: &[ClientGuid]) {
    for empfaenger in andere {
        let nachricht = Nachricht::ereignis(
            empfaenger.clone(),
            EreignisTyp::ChannelDeletedByOwner,
            Some(kanal.guid.clone()),
            kanal.guid.as_str(),
        );
        zustellen(state, empfaenger, nachricht);
    }
}

// ---------------------------------------------------------------------------
// Interne Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Schickt ein Ereignis an jeden angemeldeten Client ausser dem Betreff
fn an_alle_anderen(
    state: &Arc<BrokerState>,
    betreff: &ClientGuid,
    typ: EreignisTyp,
    kanal: Option<ChannelGuid>,
) {
    let empfaenger: Vec<ClientGuid> = state
        .registry
        .alle_clients()
        .into_iter()
        .filter(|c| c.angemeldet)
        .filter_map(|c| c.guid)
        .filter(|g| g != betreff)
        .collect();

    for ziel in empfaenger {
        let nachricht =
            Nachricht::ereignis(ziel.clone(), typ, kanal.clone(), betreff.as_str());
        zustellen(state, &ziel, nachricht);
    }
}

/// Schickt ein Ereignis an jeden Abonnenten des Kanals ausser dem Betreff
fn an_andere_abonnenten(
    state: &Arc<BrokerState>,
    kanal: &ChannelGuid,
    betreff: &ClientGuid,
    typ: EreignisTyp,
) {
    let Some(abonnenten) = state.registry.kanal_abonnenten(kanal) else {
        return;
    };
    for ziel in abonnenten.into_iter().filter(|g| g != betreff) {
        let nachricht =
            Nachricht::ereignis(ziel.clone(), typ, Some(kanal.clone()), betreff.as_str());
        zustellen(state, &ziel, nachricht);
    }
}

/// Plant die Zustellung an einen einzelnen Empfaenger ein
fn zustellen(state: &Arc<BrokerState>, ziel: &ClientGuid, nachricht: Nachricht) {
    match state.registry.sender_nach_guid(ziel) {
        Some(sender) => unabhaengig_senden(sender, nachricht),
        None => {
            tracing::debug!(ziel = %ziel, "Ereignis-Empfaenger nicht (mehr) verbunden");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ClientSender;
    use crate::registry::{ClientRecord, KanalRecord};
    use crate::rueckrufe::NoopRueckrufe;
    use crate::server_state::BrokerKonfig;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn adresse(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    /// Legt einen angemeldeten Client an und gibt seine Empfangsseite zurueck
    fn angemeldeter_client(
        state: &Arc<BrokerState>,
        port: u16,
        guid: &str,
    ) -> mpsc::Receiver<Nachricht> {
        let (sender, rx) = ClientSender::neu(adresse(port));
        state
            .registry
            .client_hinzufuegen(ClientRecord::neu(adresse(port), sender));
        state
            .registry
            .client_aktualisieren(&adresse(port), ClientGuid::from(guid), None);
        rx
    }

    fn test_state(konfig: BrokerKonfig) -> Arc<BrokerState> {
        BrokerState::neu(konfig, Arc::new(NoopRueckrufe))
    }

    #[tokio::test]
    async fn server_beitritt_erreicht_alle_anderen() {
        let state = test_state(BrokerKonfig::default());
        let mut rx1 = angemeldeter_client(&state, 5001, "c1");
        let mut rx2 = angemeldeter_client(&state, 5002, "c2");

        server_beitritt_melden(&state, &ClientGuid::from("c1"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(rx1.try_recv().is_err(), "Betreff bekommt nichts");
        let ereignis = rx2
            .try_recv()
            .expect("c2 muss das Ereignis bekommen")
            .als_ereignis()
            .expect("Ereignis-Record erwartet");
        assert_eq!(ereignis.event_type, EreignisTyp::ClientJoinedServer);
        assert_eq!(ereignis.data, serde_json::Value::String("c1".into()));
    }

    #[tokio::test]
    async fn server_ereignisse_respektieren_flag() {
        let konfig = BrokerKonfig {
            server_beitritt_ereignisse: false,
            ..BrokerKonfig::default()
        };
        let state = test_state(konfig);
        let _rx1 = angemeldeter_client(&state, 5001, "c1");
        let mut rx2 = angemeldeter_client(&state, 5002, "c2");

        server_beitritt_melden(&state, &ClientGuid::from("c1"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(rx2.try_recv().is_err(), "Flag aus – kein Ereignis");
    }

    #[tokio::test]
    async fn kanal_beitritt_nur_an_abonnenten() {
        let state = test_state(BrokerKonfig::default());
        let mut rx1 = angemeldeter_client(&state, 5001, "c1");
        let mut rx2 = angemeldeter_client(&state, 5002, "c2");
        let mut rx3 = angemeldeter_client(&state, 5003, "c3");

        let kanal = ChannelGuid::from("k1");
        state.registry.kanal_hinzufuegen(
            ClientGuid::from("c1"),
            KanalRecord::neu(kanal.clone(), "lobby", ClientGuid::from("c1"), false),
        );
        state
            .registry
            .kanal_abonnent_hinzufuegen(&kanal, ClientGuid::from("c2"));
        // c3 ist kein Abonnent

        kanal_beitritt_melden(&state, &kanal, &ClientGuid::from("c2"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let ereignis = rx1
            .try_recv()
            .expect("Besitzer muss das Ereignis bekommen")
            .als_ereignis()
            .expect("Ereignis-Record erwartet");
        assert_eq!(ereignis.event_type, EreignisTyp::ClientJoinedChannel);
        assert!(rx2.try_recv().is_err(), "Betreff bekommt nichts");
        assert!(rx3.try_recv().is_err(), "Nicht-Abonnent bekommt nichts");
    }

    #[tokio::test]
    async fn kanal_loeschung_ignoriert_flags() {
        let konfig = BrokerKonfig {
            kanal_ereignisse: false,
            server_beitritt_ereignisse: false,
            ..BrokerKonfig::default()
        };
        let state = test_state(konfig);
        let _rx1 = angemeldeter_client(&state, 5001, "c1");
        let mut rx2 = angemeldeter_client(&state, 5002, "c2");

        let kanal = KanalRecord::neu(ChannelGuid::from("k1"), "lobby", ClientGuid::from("c1"), false);
        kanal_loeschung_melden(&state, &kanal, &[ClientGuid::from("c2")]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let ereignis = rx2
            .try_recv()
            .expect("Loeschung muss ankommen")
            .als_ereignis()
            .expect("Ereignis-Record erwartet");
        assert_eq!(ereignis.event_type, EreignisTyp::ChannelDeletedByOwner);
        assert_eq!(ereignis.channel_guid, Some(ChannelGuid::from("k1")));
    }
}
