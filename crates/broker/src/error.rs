//! Fehlertypen fuer den Broker

use thiserror::Error;

/// Fehlertyp fuer den Broker-Kern
#[derive(Debug, Error)]
pub enum BrokerError {
    /// IO-Fehler (TCP, Socket, TLS)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Protokollfehler (ungueltiges Frame, ungueltiges Feld)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Ressource nicht gefunden
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Senden an Client fehlgeschlagen (Queue geschlossen oder voll)
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Server ist voll
    #[error("Server ist voll")]
    ServerVoll,

    /// Timeout (Herzschlag, Schreiben)
    #[error("Timeout")]
    Timeout,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl BrokerError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }
}

/// Result-Typ fuer den Broker-Kern
pub type BrokerResult<T> = Result<T, BrokerError>;
