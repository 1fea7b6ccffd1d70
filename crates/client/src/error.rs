//! Fehlertypen fuer die Client-Bibliothek

use switchboard_core::MessageId;
use thiserror::Error;

/// Fehler die bei der Broker-Verbindung auftreten koennen
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP-Verbindung fehlgeschlagen oder abgebrochen
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Verbindung zum Server verloren
    #[error("Verbindung getrennt")]
    Getrennt,

    /// Synchrone Anfrage ist in die Frist gelaufen
    #[error("Zeitlimit fuer Anfrage {0} ueberschritten")]
    Zeitlimit(MessageId),

    /// MessageId ist bereits als offene Anfrage registriert
    #[error("Anfrage {0} ist bereits registriert")]
    DoppelteAnfrage(MessageId),

    /// Server hat die Anfrage abgelehnt (`Success=false`)
    #[error("Server-Fehler: {0}")]
    Server(String),

    /// Unerwartete oder unvollstaendige Antwort
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Operation setzt eine Anmeldung voraus
    #[error("Nicht angemeldet")]
    NichtAngemeldet,
}

/// Result-Typ fuer die Client-Bibliothek
pub type ClientResult<T> = Result<T, ClientError>;
