//! Nachrichten-Envelope und Kommandos
//!
//! Jede ueber die Leitung laufende Einheit ist ein `Nachricht`-Envelope.
//! Alle Felder sind optional; die Feldnamen auf dem Draht sind PascalCase.
//!
//! ## Design
//! - Flacher Envelope statt tagged Enum: das Protokoll unterscheidet
//!   Kommandos ueber das `Command`-Feld (ASCII, Vergleich ohne
//!   Beachtung der Gross-/Kleinschreibung)
//! - `Data` ist ein opaker JSON-Wert; System-Ereignisse werden als
//!   verschachteltes Objekt mit `EventType`-Feld darin transportiert
//! - Zugangsdaten (`Email`, `Password`) werden vor jeder Weiterleitung
//!   und in jeder Server-Antwort entfernt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::{ChannelGuid, ClientGuid, MessageId};

// ---------------------------------------------------------------------------
// Status-Texte
// ---------------------------------------------------------------------------

/// Status-Texte die der Server im `Data`-Feld seiner Antworten verwendet
pub mod status {
    pub const LOGIN_ERFORDERLICH: &str = "login-required";
    pub const LOGIN_ERFOLG: &str = "login-success";
    pub const LOGIN_FEHLER: &str = "login-failure";
    pub const BEITRITT_ERFOLG: &str = "join-success";
    pub const BEITRITT_FEHLER: &str = "join-failure";
    pub const AUSTRITT_ERFOLG: &str = "leave-success";
    pub const AUSTRITT_FEHLER: &str = "leave-failure";
    pub const ERSTELLEN_ERFOLG: &str = "create-success";
    pub const ERSTELLEN_FEHLER: &str = "create-failure";
    pub const BEREITS_VORHANDEN: &str = "already-exists";
    pub const LOESCHEN_ERFOLG: &str = "delete-success";
    pub const LOESCHEN_FEHLER: &str = "delete-failure";
    pub const KANAL_NICHT_GEFUNDEN: &str = "channel-not-found";
    pub const EMPFAENGER_NICHT_GEFUNDEN: &str = "recipient-not-found";
    pub const KEIN_KANAL_MITGLIED: &str = "not-channel-member";
    pub const SENDE_ERFOLG: &str = "send-success";
    pub const SENDE_FEHLER: &str = "send-failure";
    pub const UNBEKANNTES_KOMMANDO: &str = "unknown-command";
    pub const UNGUELTIGE_NACHRICHT: &str = "invalid-message";
}

// ---------------------------------------------------------------------------
// Kommandos
// ---------------------------------------------------------------------------

/// Administrative Kommandos des Brokers
///
/// Kommandos werden auf dem Draht als ASCII-Strings transportiert und
/// ohne Beachtung der Gross-/Kleinschreibung verglichen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Befehl {
    Echo,
    Login,
    HeartbeatRequest,
    JoinChannel,
    LeaveChannel,
    CreateChannel,
    DeleteChannel,
    ListChannels,
    ListChannelSubscribers,
    ListClients,
    IsClientConnected,
    /// Unbekanntes Kommando (Originaltext erhalten fuer die Fehlermeldung)
    Unbekannt(String),
}

impl Befehl {
    /// Parst einen Kommando-String (case-insensitiv)
    pub fn parse(s: &str) -> Self {
        match s {
            _ if s.eq_ignore_ascii_case("Echo") => Befehl::Echo,
            _ if s.eq_ignore_ascii_case("Login") => Befehl::Login,
            _ if s.eq_ignore_ascii_case("HeartbeatRequest") => Befehl::HeartbeatRequest,
            _ if s.eq_ignore_ascii_case("JoinChannel") => Befehl::JoinChannel,
            _ if s.eq_ignore_ascii_case("LeaveChannel") => Befehl::LeaveChannel,
            _ if s.eq_ignore_ascii_case("CreateChannel") => Befehl::CreateChannel,
            _ if s.eq_ignore_ascii_case("DeleteChannel") => Befehl::DeleteChannel,
            _ if s.eq_ignore_ascii_case("ListChannels") => Befehl::ListChannels,
            _ if s.eq_ignore_ascii_case("ListChannelSubscribers") => {
                Befehl::ListChannelSubscribers
            }
            _ if s.eq_ignore_ascii_case("ListClients") => Befehl::ListClients,
            _ if s.eq_ignore_ascii_case("IsClientConnected") => Befehl::IsClientConnected,
            _ => Befehl::Unbekannt(s.to_string()),
        }
    }

    /// Kanonischer Draht-Name des Kommandos
    pub fn name(&self) -> &str {
        match self {
            Befehl::Echo => "Echo",
            Befehl::Login => "Login",
            Befehl::HeartbeatRequest => "HeartbeatRequest",
            Befehl::JoinChannel => "JoinChannel",
            Befehl::LeaveChannel => "LeaveChannel",
            Befehl::CreateChannel => "CreateChannel",
            Befehl::DeleteChannel => "DeleteChannel",
            Befehl::ListChannels => "ListChannels",
            Befehl::ListChannelSubscribers => "ListChannelSubscribers",
            Befehl::ListClients => "ListClients",
            Befehl::IsClientConnected => "IsClientConnected",
            Befehl::Unbekannt(s) => s,
        }
    }
}

// ---------------------------------------------------------------------------
// System-Ereignisse
// ---------------------------------------------------------------------------

/// Typen der systemgenerierten Benachrichtigungen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EreignisTyp {
    ClientJoinedServer,
    ClientLeftServer,
    ClientJoinedChannel,
    ClientLeftChannel,
    ChannelDeletedByOwner,
}

/// Ereignis-Record der im `Data`-Feld einer Server-Nachricht steckt
///
/// Empfaenger erkennen Ereignisse an der Praesenz des `EventType`-Felds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EreignisDaten {
    /// Art des Ereignisses
    pub event_type: EreignisTyp,
    /// Betroffener Kanal (nur bei Kanal-Ereignissen gesetzt)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_guid: Option<ChannelGuid>,
    /// Betreff des Ereignisses (Client- bzw. Kanal-Kennung)
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Listen-Eintraege
// ---------------------------------------------------------------------------

/// Client-Eintrag in Listen-Antworten (ohne Zugangsdaten und Transport)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientInfo {
    pub client_guid: ClientGuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "CreatedUTC", skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<DateTime<Utc>>,
}

/// Kanal-Eintrag in Listen-Antworten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KanalInfo {
    pub channel_guid: ChannelGuid,
    pub channel_name: String,
    pub owner_guid: ClientGuid,
    pub private: bool,
    pub subscriber_count: usize,
}

/// Payload der CreateChannel-Anfrage (steckt im `Data`-Feld)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KanalAnfrage {
    pub channel_name: String,
    #[serde(default)]
    pub private: bool,
}

// ---------------------------------------------------------------------------
// Nachricht
// ---------------------------------------------------------------------------

/// Der universelle Nachrichten-Envelope
///
/// Eine Nachricht ist gueltig wenn sie entweder ein Kommando traegt
/// oder genau ein Nutzlast-Ziel (`RecipientGuid` xor `ChannelGuid`)
/// zusammen mit einem nicht-leeren `SenderGuid`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Nachricht {
    /// Eindeutig pro Anfrage; Pflicht wenn eine Antwort korreliert werden soll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_guid: Option<ClientGuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_guid: Option<ClientGuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_guid: Option<ChannelGuid>,
    /// Administratives Kommando; fehlt bei reinen Nutzlast-Nachrichten
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Zeitstempel des Absenders (UTC)
    #[serde(rename = "CreatedUTC", skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<DateTime<Utc>>,
    /// Zugangsdaten – nur beim Login vorhanden, werden vor jeder
    /// Weiterleitung entfernt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sync_request: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sync_response: bool,
    /// Vom Server auf Antworten gesetzt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Opake Nutzlast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Nachricht {
    /// Erstellt einen leeren Envelope
    pub fn neu() -> Self {
        Self::default()
    }

    /// Erstellt eine Kommando-Nachricht mit gestempeltem Zeitpunkt
    pub fn kommando(befehl: Befehl) -> Self {
        Self {
            command: Some(befehl.name().to_string()),
            created_utc: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Parst das `Command`-Feld (case-insensitiv)
    pub fn befehl(&self) -> Option<Befehl> {
        self.command.as_deref().map(Befehl::parse)
    }

    /// Prueft die Gueltigkeitsregel des Envelopes
    ///
    /// Gueltig ist: ein Kommando, oder genau ein Ziel (Empfaenger xor
    /// Kanal) mit nicht-leerem Absender. Server-eigene Nachrichten
    /// tragen die reservierte Server-Kennung als Absender.
    pub fn ist_gueltig(&self) -> bool {
        if self.command.is_some() {
            return true;
        }
        let hat_empfaenger = self.recipient_guid.as_ref().is_some_and(|g| !g.ist_leer());
        let hat_kanal = self.channel_guid.as_ref().is_some_and(|g| !g.ist_leer());
        if hat_empfaenger == hat_kanal {
            return false;
        }
        self.sender_guid.as_ref().is_some_and(|g| !g.ist_leer())
    }

    /// Entfernt die Zugangsdaten aus dem Envelope
    pub fn bereinigen(&mut self) {
        self.email = None;
        self.password = None;
    }

    /// Konsumierende Variante von [`bereinigen`](Self::bereinigen)
    pub fn bereinigt(mut self) -> Self {
        self.bereinigen();
        self
    }

    /// Formt die Server-Antwort auf eine Anfrage
    ///
    /// Regeln: Zugangsdaten entfernt, Absender = Server-Kennung,
    /// Empfaenger = urspruenglicher Absender, `SyncRequest` der Anfrage
    /// wird als `SyncResponse` gespiegelt, `CreatedUTC` neu gestempelt.
    pub fn antwort_auf(anfrage: &Nachricht, erfolg: bool, data: Option<Value>) -> Self {
        Self {
            message_id: anfrage.message_id.clone(),
            sender_guid: Some(ClientGuid::server()),
            recipient_guid: anfrage.sender_guid.clone(),
            channel_guid: anfrage.channel_guid.clone(),
            command: None,
            created_utc: Some(Utc::now()),
            email: None,
            password: None,
            sync_request: false,
            sync_response: anfrage.sync_request,
            success: Some(erfolg),
            data,
        }
    }

    /// Kurzform fuer eine Fehler-Antwort mit Status-Text im `Data`-Feld
    pub fn fehler_antwort(anfrage: &Nachricht, status_text: &str) -> Self {
        Self::antwort_auf(anfrage, false, Some(Value::String(status_text.to_string())))
    }

    /// Erstellt die server-seitige Heartbeat-Anfrage (keine Nutzlast)
    pub fn herzschlag() -> Self {
        Self {
            sender_guid: Some(ClientGuid::server()),
            command: Some(Befehl::HeartbeatRequest.name().to_string()),
            created_utc: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Erstellt eine server-seitige Ereignis-Benachrichtigung
    ///
    /// Das Ereignis wird als verschachteltes Objekt in `Data` kodiert.
    pub fn ereignis(
        empfaenger: ClientGuid,
        typ: EreignisTyp,
        kanal: Option<ChannelGuid>,
        betreff: &str,
    ) -> Self {
        let daten = EreignisDaten {
            event_type: typ,
            channel_guid: kanal,
            data: Value::String(betreff.to_string()),
        };
        Self {
            message_id: Some(MessageId::new()),
            sender_guid: Some(ClientGuid::server()),
            recipient_guid: Some(empfaenger),
            created_utc: Some(Utc::now()),
            data: serde_json::to_value(daten).ok(),
            ..Self::default()
        }
    }

    /// Dekodiert das `Data`-Feld als Ereignis-Record, falls vorhanden
    pub fn als_ereignis(&self) -> Option<EreignisDaten> {
        let data = self.data.as_ref()?;
        data.get("EventType")?;
        serde_json::from_value(data.clone()).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
