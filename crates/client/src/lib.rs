//! switchboard-client – Client-Bibliothek fuer den Switchboard-Broker
//!
//! Baut eine TCP-Verbindung zum Broker auf, wickelt Login und
//! Kommandos ab und stellt synchrone Anfragen ueber den
//! [`SyncKorrelator`] zu. Ein Hintergrund-Task liest laufend vom
//! Socket und routet:
//!
//! - `HeartbeatRequest` → stillschweigend konsumiert (keine Antwort)
//! - Sync-Antworten → in den Korrelator, der Warter wird geweckt
//! - Sync-Anfragen anderer Clients → an den `sync_anfrage`-Rueckruf,
//!   dessen Ergebnis als Sync-Antwort zurueckgeht
//! - alles andere → an den `nachricht`-Rueckruf

pub mod error;
pub mod korrelation;

pub use error::{ClientError, ClientResult};
pub use korrelation::SyncKorrelator;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use switchboard_core::{ChannelGuid, ClientGuid, MessageId};
use switchboard_protocol::{
    Befehl, ClientInfo, Dekodiert, FrameCodec, KanalAnfrage, KanalInfo, Nachricht,
};

/// Groesse der Schreib-Queue des Clients
const SCHREIB_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Konfiguration & Rueckrufe
// ---------------------------------------------------------------------------

/// Konfiguration der Client-Bibliothek
#[derive(Debug, Clone)]
pub struct ClientKonfig {
    /// Frist fuer synchrone Anfragen in Millisekunden
    pub sync_timeout_ms: u64,
}

impl Default for ClientKonfig {
    fn default() -> Self {
        Self {
            sync_timeout_ms: 10_000,
        }
    }
}

/// Rueckruf fuer asynchron zugestellte Nachrichten
pub type NachrichtRueckruf = Arc<dyn Fn(Nachricht) + Send + Sync>;

/// Rueckruf fuer eingehende Sync-Anfragen anderer Clients
///
/// Das Ergebnis (falls vorhanden) geht als Sync-Antwort an den
/// urspruenglichen Absender zurueck.
pub type SyncAnfrageRueckruf = Arc<dyn Fn(Nachricht) -> Option<Value> + Send + Sync>;

/// Einhaenge-Punkte der Client-Bibliothek; alle optional
#[derive(Default, Clone)]
pub struct ClientRueckrufe {
    pub nachricht: Option<NachrichtRueckruf>,
    pub sync_anfrage: Option<SyncAnfrageRueckruf>,
}

// ---------------------------------------------------------------------------
// BrokerClient
// ---------------------------------------------------------------------------

/// Geteilter Kennungs-Speicher (nach dem Login gesetzt)
type GuidZelle = Arc<std::sync::RwLock<Option<ClientGuid>>>;

/// Verbindung eines Clients zum Switchboard-Broker
pub struct BrokerClient {
    guid: GuidZelle,
    sende_tx: mpsc::Sender<Nachricht>,
    korrelator: Arc<SyncKorrelator>,
    lese_task: JoinHandle<()>,
    schreib_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
}

impl BrokerClient {
    /// Baut eine TCP-Verbindung zum Broker auf und startet die
    /// Hintergrund-Tasks (Leser, Schreiber, Sweep)
    pub async fn verbinden(
        adresse: impl ToSocketAddrs,
        konfig: ClientKonfig,
        rueckrufe: ClientRueckrufe,
    ) -> ClientResult<Self> {
        let stream = TcpStream::connect(adresse).await?;
        let framed = Framed::new(stream, FrameCodec::new());
        let (mut schreib_haelfte, mut lese_haelfte) = framed.split();

        let (sende_tx, mut sende_rx) = mpsc::channel::<Nachricht>(SCHREIB_QUEUE_GROESSE);
        let korrelator = SyncKorrelator::neu(Duration::from_millis(konfig.sync_timeout_ms));
        let sweep_task = SyncKorrelator::sweeper_starten(&korrelator);
        let guid: GuidZelle = Arc::new(std::sync::RwLock::new(None));

        // Schreiber: einziger Socket-Schreiber, gespeist aus der Queue
        let schreib_task = tokio::spawn(async move {
            while let Some(nachricht) = sende_rx.recv().await {
                if let Err(e) = schreib_haelfte.send(nachricht).await {
                    tracing::warn!(fehler = %e, "Schreiben zum Broker fehlgeschlagen");
                    break;
                }
            }
        });

        // Leser: routet alles Eingehende
        let lese_korrelator = Arc::clone(&korrelator);
        let lese_guid = Arc::clone(&guid);
        let lese_sende_tx = sende_tx.clone();
        let lese_task = tokio::spawn(async move {
            loop {
                match lese_haelfte.next().await {
                    Some(Ok(Dekodiert::Nachricht(nachricht))) => {
                        eingang_behandeln(
                            nachricht,
                            &lese_korrelator,
                            &rueckrufe,
                            &lese_guid,
                            &lese_sende_tx,
                        )
                        .await;
                    }
                    Some(Ok(Dekodiert::Fehlerhaft(grund))) => {
                        tracing::warn!(grund = %grund, "Undekodierbarer Frame vom Broker");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Lesefehler – Verbindung beendet");
                        break;
                    }
                    None => {
                        tracing::info!("Verbindung vom Broker getrennt");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            guid,
            sende_tx,
            korrelator,
            lese_task,
            schreib_task,
            sweep_task,
        })
    }

    /// Gibt die eigene Kennung zurueck (nach dem Login gesetzt)
    pub fn guid(&self) -> Option<ClientGuid> {
        self.guid.read().ok().and_then(|g| g.clone())
    }

    /// Meldet den Client am Broker an
    ///
    /// Ohne `guid` vergibt der Server eine Kennung; sie steht danach
    /// ueber [`guid`](Self::guid) bereit.
    pub async fn anmelden(
        &self,
        guid: Option<ClientGuid>,
        email: &str,
        passwort: &str,
    ) -> ClientResult<Nachricht> {
        let mut anfrage = Nachricht::kommando(Befehl::Login);
        anfrage.sender_guid = guid;
        anfrage.email = Some(email.to_string());
        anfrage.password = Some(passwort.to_string());

        let antwort = self.anfrage_sync(anfrage).await?;
        let antwort = erfolg_pruefen(antwort)?;

        // Vergebene bzw. bestaetigte Kennung uebernehmen
        let vergeben = antwort
            .recipient_guid
            .clone()
            .ok_or_else(|| ClientError::Protokoll("Login-Antwort ohne Kennung".into()))?;
        if let Ok(mut zelle) = self.guid.write() {
            *zelle = Some(vergeben);
        }

        Ok(antwort)
    }

    /// Schickt eine Nachricht asynchron (Feuer-und-Vergessen)
    ///
    /// Eine etwaige Sende-Bestaetigung des Brokers kommt ueber den
    /// `nachricht`-Rueckruf herein.
    pub async fn senden(&self, nachricht: Nachricht) -> ClientResult<()> {
        self.sende_tx
            .send(nachricht)
            .await
            .map_err(|_| ClientError::Getrennt)
    }

    /// Schickt eine Anfrage synchron und wartet auf die Antwort
    ///
    /// Setzt `SyncRequest` und registriert die `MessageId` im
    /// Korrelator; die Antwort kommt ueber den Lese-Task herein.
    pub async fn anfrage_sync(&self, mut anfrage: Nachricht) -> ClientResult<Nachricht> {
        let id = anfrage.message_id.clone().unwrap_or_default();
        anfrage.message_id = Some(id.clone());
        anfrage.sync_request = true;
        if anfrage.created_utc.is_none() {
            anfrage.created_utc = Some(Utc::now());
        }

        let rx = self.korrelator.registrieren(id.clone()).await?;
        self.senden(anfrage).await?;
        self.korrelator.warten(&id, rx).await
    }

    /// Diagnose: Echo mit beliebiger Nutzlast
    pub async fn echo(&self, data: Value) -> ClientResult<Nachricht> {
        let mut anfrage = self.kommando(Befehl::Echo)?;
        anfrage.data = Some(data);
        erfolg_pruefen(self.anfrage_sync(anfrage).await?)
    }

    /// Schickt eine Direkt-Nachricht asynchron an einen Client
    pub async fn privat_senden(&self, empfaenger: ClientGuid, data: Value) -> ClientResult<()> {
        let mut nachricht = self.nutzlast()?;
        nachricht.recipient_guid = Some(empfaenger);
        nachricht.data = Some(data);
        self.senden(nachricht).await
    }

    /// Schickt eine Direkt-Nachricht synchron und wartet auf die
    /// Antwort des Gegenuebers
    pub async fn privat_senden_sync(
        &self,
        empfaenger: ClientGuid,
        data: Value,
    ) -> ClientResult<Nachricht> {
        let mut nachricht = self.nutzlast()?;
        nachricht.recipient_guid = Some(empfaenger);
        nachricht.data = Some(data);
        self.anfrage_sync(nachricht).await
    }

    /// Schickt eine Nachricht asynchron in einen Kanal
    pub async fn kanal_senden(&self, kanal: ChannelGuid, data: Value) -> ClientResult<()> {
        let mut nachricht = self.nutzlast()?;
        nachricht.channel_guid = Some(kanal);
        nachricht.data = Some(data);
        self.senden(nachricht).await
    }

    /// Legt einen Kanal an
    pub async fn kanal_erstellen(
        &self,
        kanal: ChannelGuid,
        name: &str,
        privat: bool,
    ) -> ClientResult<Nachricht> {
        let mut anfrage = self.kommando(Befehl::CreateChannel)?;
        anfrage.channel_guid = Some(kanal);
        anfrage.data = serde_json::to_value(KanalAnfrage {
            channel_name: name.to_string(),
            private: privat,
        })
        .ok();
        erfolg_pruefen(self.anfrage_sync(anfrage).await?)
    }

    /// Tritt einem Kanal bei
    pub async fn kanal_beitreten(&self, kanal: ChannelGuid) -> ClientResult<Nachricht> {
        let mut anfrage = self.kommando(Befehl::JoinChannel)?;
        anfrage.channel_guid = Some(kanal);
        erfolg_pruefen(self.anfrage_sync(anfrage).await?)
    }

    /// Verlaesst einen Kanal (als Besitzer: loest ihn auf)
    pub async fn kanal_verlassen(&self, kanal: ChannelGuid) -> ClientResult<Nachricht> {
        let mut anfrage = self.kommando(Befehl::LeaveChannel)?;
        anfrage.channel_guid = Some(kanal);
        erfolg_pruefen(self.anfrage_sync(anfrage).await?)
    }

    /// Loescht einen eigenen Kanal
    pub async fn kanal_loeschen(&self, kanal: ChannelGuid) -> ClientResult<Nachricht> {
        let mut anfrage = self.kommando(Befehl::DeleteChannel)?;
        anfrage.channel_guid = Some(kanal);
        erfolg_pruefen(self.anfrage_sync(anfrage).await?)
    }

    /// Listet die sichtbaren Kanaele auf
    pub async fn kanaele_auflisten(&self) -> ClientResult<Vec<KanalInfo>> {
        let anfrage = self.kommando(Befehl::ListChannels)?;
        let antwort = erfolg_pruefen(self.anfrage_sync(anfrage).await?)?;
        liste_lesen(antwort)
    }

    /// Listet die Abonnenten eines Kanals auf
    pub async fn kanal_abonnenten(&self, kanal: ChannelGuid) -> ClientResult<Vec<ClientInfo>> {
        let mut anfrage = self.kommando(Befehl::ListChannelSubscribers)?;
        anfrage.channel_guid = Some(kanal);
        let antwort = erfolg_pruefen(self.anfrage_sync(anfrage).await?)?;
        liste_lesen(antwort)
    }

    /// Listet alle angemeldeten Clients auf
    pub async fn clients_auflisten(&self) -> ClientResult<Vec<ClientInfo>> {
        let anfrage = self.kommando(Befehl::ListClients)?;
        let antwort = erfolg_pruefen(self.anfrage_sync(anfrage).await?)?;
        liste_lesen(antwort)
    }

    /// Prueft ob ein Client mit der Kennung verbunden ist
    pub async fn ist_client_verbunden(&self, ziel: &ClientGuid) -> ClientResult<bool> {
        let mut anfrage = self.kommando(Befehl::IsClientConnected)?;
        anfrage.data = Some(Value::String(ziel.as_str().to_string()));
        let antwort = erfolg_pruefen(self.anfrage_sync(anfrage).await?)?;
        antwort
            .data
            .as_ref()
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ClientError::Protokoll("Bool-Antwort erwartet".into()))
    }

    /// Trennt die Verbindung und beendet die Hintergrund-Tasks
    pub fn trennen(self) {
        // Drop raeumt Tasks und Socket
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Kommando-Envelope mit eigener Kennung als Absender
    fn kommando(&self, befehl: Befehl) -> ClientResult<Nachricht> {
        let guid = self.guid().ok_or(ClientError::NichtAngemeldet)?;
        let mut nachricht = Nachricht::kommando(befehl);
        nachricht.sender_guid = Some(guid);
        Ok(nachricht)
    }

    /// Nutzlast-Envelope (ohne Kommando) mit eigener Kennung
    fn nutzlast(&self) -> ClientResult<Nachricht> {
        let guid = self.guid().ok_or(ClientError::NichtAngemeldet)?;
        let mut nachricht = Nachricht::neu();
        nachricht.sender_guid = Some(guid);
        nachricht.message_id = Some(MessageId::new());
        nachricht.created_utc = Some(Utc::now());
        Ok(nachricht)
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.lese_task.abort();
        self.schreib_task.abort();
        self.sweep_task.abort();
    }
}

// ---------------------------------------------------------------------------
// Eingangs-Routing
// ---------------------------------------------------------------------------

/// Routet eine vom Broker empfangene Nachricht
async fn eingang_behandeln(
    nachricht: Nachricht,
    korrelator: &Arc<SyncKorrelator>,
    rueckrufe: &ClientRueckrufe,
    guid: &GuidZelle,
    sende_tx: &mpsc::Sender<Nachricht>,
) {
    // Server-Herzschlaege werden stillschweigend konsumiert
    if matches!(nachricht.befehl(), Some(Befehl::HeartbeatRequest)) {
        return;
    }

    // Sync-Antworten in den Korrelator; unaufgeforderte fallen durch
    let nachricht = if nachricht.sync_response {
        match korrelator.zustellen(nachricht).await {
            None => return,
            Some(unaufgefordert) => unaufgefordert,
        }
    } else {
        nachricht
    };

    // Sync-Anfragen anderer Clients beantworten
    if nachricht.sync_request {
        if let Some(handler) = &rueckrufe.sync_anfrage {
            if let Some(daten) = handler(nachricht.clone()) {
                let mut antwort = Nachricht::neu();
                antwort.message_id = nachricht.message_id.clone();
                antwort.sender_guid = guid.read().ok().and_then(|g| g.clone());
                antwort.recipient_guid = nachricht.sender_guid.clone();
                antwort.sync_response = true;
                antwort.created_utc = Some(Utc::now());
                antwort.data = Some(daten);
                if sende_tx.send(antwort).await.is_err() {
                    tracing::debug!("Sync-Antwort nicht absetzbar (Verbindung weg)");
                }
            }
            return;
        }
    }

    if let Some(handler) = &rueckrufe.nachricht {
        handler(nachricht);
    }
}

/// Prueft das `Success`-Flag einer Server-Antwort
fn erfolg_pruefen(antwort: Nachricht) -> ClientResult<Nachricht> {
    match antwort.success {
        Some(true) => Ok(antwort),
        _ => {
            let grund = antwort
                .data
                .as_ref()
                .and_then(|v| v.as_str())
                .unwrap_or("unbekannt")
                .to_string();
            Err(ClientError::Server(grund))
        }
    }
}

/// Dekodiert eine Listen-Antwort aus dem `Data`-Feld
fn liste_lesen<T: serde::de::DeserializeOwned>(antwort: Nachricht) -> ClientResult<Vec<T>> {
    let data = antwort
        .data
        .ok_or_else(|| ClientError::Protokoll("Listen-Antwort ohne Data".into()))?;
    serde_json::from_value(data)
        .map_err(|e| ClientError::Protokoll(format!("Liste nicht lesbar: {e}")))
}
