//! Integrationstests: Broker und Client ueber echtes TCP
//!
//! Jeder Test startet einen Broker auf einem ephemeren Port und
//! verbindet Clients ueber die switchboard-client-Bibliothek.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use switchboard_broker::{BrokerKonfig, BrokerServer, BrokerState, NoopRueckrufe};
use switchboard_client::{BrokerClient, ClientKonfig, ClientRueckrufe};
use switchboard_core::{ChannelGuid, ClientGuid};
use switchboard_protocol::{status, EreignisTyp, Nachricht};

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Startet einen Broker auf einem ephemeren Port
async fn broker_starten(konfig: BrokerKonfig) -> (SocketAddr, watch::Sender<bool>) {
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

/// Konfiguration ohne Herzschlag und ohne Ereignisse (ruhige Leitung)
fn ruhige_konfig() -> BrokerKonfig {
    BrokerKonfig {
        herzschlag_intervall_ms: 0,
        server_beitritt_ereignisse: false,
        kanal_ereignisse: false,
        ..BrokerKonfig::default()
    }
}

/// Rueckrufe die alles Eingehende in einen Kanal kippen
fn sammelnde_rueckrufe() -> (ClientRueckrufe, mpsc::UnboundedReceiver<Nachricht>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let rueckrufe = ClientRueckrufe {
        nachricht: Some(Arc::new(move |n| {
            let _ = tx.send(n);
        })),
        sync_anfrage: None,
    };
    (rueckrufe, rx)
}

/// Verbindet und meldet einen Client mit fester Kennung an
async fn angemeldeter_client(
    adresse: SocketAddr,
    guid: &str,
) -> (BrokerClient, mpsc::UnboundedReceiver<Nachricht>) {
    let (rueckrufe, rx) = sammelnde_rueckrufe();
    let client = BrokerClient::verbinden(adresse, ClientKonfig::default(), rueckrufe)
        .await
        .expect("Verbindung muss gelingen");
    client
        .anmelden(
            Some(ClientGuid::from(guid)),
            &format!("{guid}@test"),
            "geheim",
        )
        .await
        .expect("Login muss gelingen");
    (client, rx)
}

/// Naechste Nachricht mit Frist
async fn empfangen(rx: &mut mpsc::UnboundedReceiver<Nachricht>) -> Nachricht {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Frist beim Empfangen ueberschritten")
        .expect("Kanal geschlossen")
}

/// Naechstes System-Ereignis des angegebenen Typs mit Frist
async fn ereignis_erwarten(
    rx: &mut mpsc::UnboundedReceiver<Nachricht>,
    typ: EreignisTyp,
) -> switchboard_protocol::EreignisDaten {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let nachricht = rx.recv().await.expect("Kanal geschlossen");
            if let Some(ereignis) = nachricht.als_ereignis() {
                if ereignis.event_type == typ {
                    return ereignis;
                }
            }
        }
    })
    .await
    .expect("Ereignis-Frist ueberschritten")
}

// ---------------------------------------------------------------------------
// Szenarien
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_dann_echo() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (client, _rx) = angemeldeter_client(adresse, "c1").await;

    let antwort = client.echo(Value::String("hi".into())).await.unwrap();
    assert_eq!(antwort.data, Some(Value::String("hi".into())));
    assert!(antwort.sync_response);
    assert!(antwort.sender_guid.as_ref().unwrap().ist_server());
    assert_eq!(antwort.recipient_guid, Some(ClientGuid::from("c1")));
}

#[tokio::test]
async fn login_vergibt_kennung_wenn_keine_mitgebracht_wird() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;

    let (rueckrufe, _rx) = sammelnde_rueckrufe();
    let client = BrokerClient::verbinden(adresse, ClientKonfig::default(), rueckrufe)
        .await
        .unwrap();
    client.anmelden(None, "wer@test", "geheim").await.unwrap();

    let guid = client.guid().expect("vergebene Kennung erwartet");
    assert!(!guid.ist_leer());
    assert!(client.ist_client_verbunden(&guid).await.unwrap());
}

#[tokio::test]
async fn ohne_login_kommt_login_required() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;

    let (rueckrufe, _rx) = sammelnde_rueckrufe();
    let client = BrokerClient::verbinden(adresse, ClientKonfig::default(), rueckrufe)
        .await
        .unwrap();

    // Kommando ohne vorherigen Login direkt absetzen
    let mut anfrage = Nachricht::kommando(switchboard_protocol::Befehl::ListClients);
    anfrage.sender_guid = Some(ClientGuid::from("fremd"));
    let fehler = client.anfrage_sync(anfrage).await.unwrap();
    assert_eq!(fehler.success, Some(false));
    assert_eq!(
        fehler.data,
        Some(Value::String(status::LOGIN_ERFORDERLICH.into()))
    );
}

#[tokio::test]
async fn private_async_zustellung_mit_bestaetigung() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, mut rx1) = angemeldeter_client(adresse, "c1").await;
    let (_c2, mut rx2) = angemeldeter_client(adresse, "c2").await;

    c1.privat_senden(ClientGuid::from("c2"), Value::String("hello".into()))
        .await
        .unwrap();

    // c2 bekommt die bereinigte Kopie
    let kopie = empfangen(&mut rx2).await;
    assert_eq!(kopie.data, Some(Value::String("hello".into())));
    assert_eq!(kopie.sender_guid, Some(ClientGuid::from("c1")));
    assert!(kopie.email.is_none(), "Email muss entfernt sein");
    assert!(kopie.password.is_none(), "Password muss entfernt sein");

    // c1 bekommt die Sende-Bestaetigung
    let ack = empfangen(&mut rx1).await;
    assert_eq!(ack.success, Some(true));
    assert_eq!(ack.data, Some(Value::String(status::SENDE_ERFOLG.into())));
}

#[tokio::test]
async fn private_sync_rundreise() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;

    // c2 beantwortet Sync-Anfragen mit "pong"
    let rueckrufe = ClientRueckrufe {
        nachricht: None,
        sync_anfrage: Some(Arc::new(|anfrage| {
            assert_eq!(anfrage.data, Some(Value::String("ping".into())));
            Some(Value::String("pong".into()))
        })),
    };
    let c2 = BrokerClient::verbinden(adresse, ClientKonfig::default(), rueckrufe)
        .await
        .unwrap();
    c2.anmelden(Some(ClientGuid::from("c2")), "c2@test", "geheim")
        .await
        .unwrap();

    let antwort = c1
        .privat_senden_sync(ClientGuid::from("c2"), Value::String("ping".into()))
        .await
        .unwrap();
    assert_eq!(antwort.data, Some(Value::String("pong".into())));
    assert!(antwort.sync_response);
    assert_eq!(antwort.sender_guid, Some(ClientGuid::from("c2")));
    assert_eq!(antwort.recipient_guid, Some(ClientGuid::from("c1")));
}

#[tokio::test]
async fn unbekannter_empfaenger_meldet_fehler() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, mut rx1) = angemeldeter_client(adresse, "c1").await;

    c1.privat_senden(ClientGuid::from("geist"), Value::String("hallo".into()))
        .await
        .unwrap();

    let antwort = empfangen(&mut rx1).await;
    assert_eq!(antwort.success, Some(false));
    assert_eq!(
        antwort.data,
        Some(Value::String(status::EMPFAENGER_NICHT_GEFUNDEN.into()))
    );
}

#[tokio::test]
async fn kanal_fanout_erreicht_jeden_abonnenten_genau_einmal() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, mut rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, mut rx2) = angemeldeter_client(adresse, "c2").await;
    let (c3, mut rx3) = angemeldeter_client(adresse, "c3").await;

    let kanal = ChannelGuid::from("ch1");
    c1.kanal_erstellen(kanal.clone(), "lobby", false).await.unwrap();
    c2.kanal_beitreten(kanal.clone()).await.unwrap();
    c3.kanal_beitreten(kanal.clone()).await.unwrap();

    c1.kanal_senden(kanal.clone(), Value::String("an alle".into()))
        .await
        .unwrap();

    for rx in [&mut rx2, &mut rx3] {
        let kopie = empfangen(rx).await;
        assert_eq!(kopie.data, Some(Value::String("an alle".into())));
        assert_eq!(kopie.sender_guid, Some(ClientGuid::from("c1")));
        assert_eq!(kopie.channel_guid, Some(kanal.clone()));
        assert!(kopie.email.is_none());
    }

    // c1 bekommt nur die Bestaetigung, keine eigene Kopie
    let ack = empfangen(&mut rx1).await;
    assert_eq!(ack.data, Some(Value::String(status::SENDE_ERFOLG.into())));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        rx1.try_recv().is_err(),
        "Absender darf keine Kanal-Kopie bekommen"
    );
    assert!(rx2.try_recv().is_err(), "genau eine Kopie pro Abonnent");
    assert!(rx3.try_recv().is_err(), "genau eine Kopie pro Abonnent");
}

#[tokio::test]
async fn fanout_ohne_mitgliedschaft_wird_abgelehnt() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, mut rx2) = angemeldeter_client(adresse, "c2").await;

    let kanal = ChannelGuid::from("ch1");
    c1.kanal_erstellen(kanal.clone(), "lobby", false).await.unwrap();

    c2.kanal_senden(kanal, Value::String("rein da".into()))
        .await
        .unwrap();
    let antwort = empfangen(&mut rx2).await;
    assert_eq!(antwort.success, Some(false));
    assert_eq!(
        antwort.data,
        Some(Value::String(status::KEIN_KANAL_MITGLIED.into()))
    );
}

#[tokio::test]
async fn fanout_ohne_andere_abonnenten_bestaetigt_trotzdem() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, mut rx1) = angemeldeter_client(adresse, "c1").await;

    let kanal = ChannelGuid::from("leer");
    c1.kanal_erstellen(kanal.clone(), "leer", false).await.unwrap();
    c1.kanal_senden(kanal, Value::String("hallo?".into()))
        .await
        .unwrap();

    let ack = empfangen(&mut rx1).await;
    assert_eq!(ack.success, Some(true));
    assert_eq!(ack.data, Some(Value::String(status::SENDE_ERFOLG.into())));
}

#[tokio::test]
async fn besitzer_verlaesst_kanal_und_abonnenten_werden_benachrichtigt() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, mut rx2) = angemeldeter_client(adresse, "c2").await;
    let (c3, mut rx3) = angemeldeter_client(adresse, "c3").await;

    let kanal = ChannelGuid::from("ch1");
    c1.kanal_erstellen(kanal.clone(), "lobby", false).await.unwrap();
    c2.kanal_beitreten(kanal.clone()).await.unwrap();
    c3.kanal_beitreten(kanal.clone()).await.unwrap();

    let antwort = c1.kanal_verlassen(kanal.clone()).await.unwrap();
    assert_eq!(
        antwort.data,
        Some(Value::String(status::LOESCHEN_ERFOLG.into()))
    );

    for rx in [&mut rx2, &mut rx3] {
        let ereignis = ereignis_erwarten(rx, EreignisTyp::ChannelDeletedByOwner).await;
        assert_eq!(ereignis.channel_guid, Some(kanal.clone()));
    }

    // Der Kanal taucht in keiner Liste mehr auf
    let kanaele = c2.kanaele_auflisten().await.unwrap();
    assert!(kanaele.is_empty());
}

#[tokio::test]
async fn doppeltes_erstellen_meldet_already_exists() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;

    c1.kanal_erstellen(ChannelGuid::from("k1"), "lobby", false)
        .await
        .unwrap();
    let fehler = c1
        .kanal_erstellen(ChannelGuid::from("k2"), "lobby", false)
        .await
        .expect_err("zweites Erstellen muss scheitern");
    assert!(fehler.to_string().contains(status::BEREITS_VORHANDEN));
}

#[tokio::test]
async fn doppelter_beitritt_bleibt_eine_mitgliedschaft() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, _rx2) = angemeldeter_client(adresse, "c2").await;

    let kanal = ChannelGuid::from("k1");
    c1.kanal_erstellen(kanal.clone(), "lobby", false).await.unwrap();
    c2.kanal_beitreten(kanal.clone()).await.unwrap();
    c2.kanal_beitreten(kanal.clone()).await.unwrap();

    let abonnenten = c1.kanal_abonnenten(kanal.clone()).await.unwrap();
    assert_eq!(abonnenten.len(), 2, "Besitzer + c2, keine Duplikate");

    // Doppeltes Verlassen: erst Erfolg, dann Fehlschlag
    c2.kanal_verlassen(kanal.clone()).await.unwrap();
    assert!(c2.kanal_verlassen(kanal.clone()).await.is_err());
}

#[tokio::test]
async fn private_kanaele_sind_fuer_fremde_unsichtbar() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, _rx2) = angemeldeter_client(adresse, "c2").await;

    c1.kanal_erstellen(ChannelGuid::from("k1"), "offen", false)
        .await
        .unwrap();
    c1.kanal_erstellen(ChannelGuid::from("k2"), "geheim", true)
        .await
        .unwrap();

    let eigene = c1.kanaele_auflisten().await.unwrap();
    assert_eq!(eigene.len(), 2);

    let fremde = c2.kanaele_auflisten().await.unwrap();
    assert_eq!(fremde.len(), 1);
    assert_eq!(fremde[0].channel_name, "offen");
}

#[tokio::test]
async fn listen_sind_bereinigt() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;
    let (_c2, _rx2) = angemeldeter_client(adresse, "c2").await;

    let clients = c1.clients_auflisten().await.unwrap();
    assert_eq!(clients.len(), 2);
    for client in &clients {
        assert!(client.email.as_deref().unwrap_or("").contains("@test"));
    }
}

#[tokio::test]
async fn trennung_meldet_server_austritt() {
    // Server-Ereignisse eingeschaltet, Kanal-Ereignisse aus
    let konfig = BrokerKonfig {
        herzschlag_intervall_ms: 0,
        kanal_ereignisse: false,
        ..BrokerKonfig::default()
    };
    let (adresse, _shutdown) = broker_starten(konfig).await;
    let (_c1, mut rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, _rx2) = angemeldeter_client(adresse, "c2").await;

    // c1 sieht zuerst den Beitritt von c2
    let beitritt = ereignis_erwarten(&mut rx1, EreignisTyp::ClientJoinedServer).await;
    assert_eq!(beitritt.data, Value::String("c2".into()));

    c2.trennen();

    let austritt = ereignis_erwarten(&mut rx1, EreignisTyp::ClientLeftServer).await;
    assert_eq!(austritt.data, Value::String("c2".into()));
}

#[tokio::test]
async fn getrennter_client_ist_nicht_mehr_verbunden() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;
    let (c1, _rx1) = angemeldeter_client(adresse, "c1").await;
    let (c2, _rx2) = angemeldeter_client(adresse, "c2").await;

    assert!(c1.ist_client_verbunden(&ClientGuid::from("c2")).await.unwrap());

    c2.trennen();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!c1.ist_client_verbunden(&ClientGuid::from("c2")).await.unwrap());
}

#[tokio::test]
async fn sync_anfrage_ohne_antwortenden_laeuft_in_die_frist() {
    let (adresse, _shutdown) = broker_starten(ruhige_konfig()).await;

    // c2 hat keinen sync_anfrage-Handler und antwortet deshalb nie
    let (_c2, _rx2) = angemeldeter_client(adresse, "c2").await;

    // c1 mit kurzer Sync-Frist
    let (rueckrufe, _rx1) = sammelnde_rueckrufe();
    let c1 = BrokerClient::verbinden(
        adresse,
        ClientKonfig {
            sync_timeout_ms: 200,
        },
        rueckrufe,
    )
    .await
    .unwrap();
    c1.anmelden(Some(ClientGuid::from("c1")), "c1@test", "geheim")
        .await
        .unwrap();

    let fehler = c1
        .privat_senden_sync(ClientGuid::from("c2"), Value::String("ping".into()))
        .await;
    assert!(fehler.is_err(), "ohne Antwort muss die Frist greifen");
}
