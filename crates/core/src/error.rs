//! Fehlertypen fuer Switchboard
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Switchboard
pub type Result<T> = std::result::Result<T, SwitchboardError>;

/// Alle moeglichen Fehler im Switchboard-System
#[derive(Debug, Error)]
pub enum SwitchboardError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Anmeldung ---
    #[error("Anmeldung erforderlich")]
    AnmeldungErforderlich,

    #[error("Anmeldung fehlgeschlagen: {0}")]
    Anmeldung(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Unbekanntes Kommando: {0}")]
    UnbekanntesKommando(String),

    // --- Ressourcen ---
    #[error("Kanal nicht gefunden: {0}")]
    KanalNichtGefunden(String),

    #[error("Empfaenger nicht gefunden: {0}")]
    EmpfaengerNichtGefunden(String),

    #[error("Server voll: maximale Clientanzahl erreicht")]
    ServerVoll,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SwitchboardError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Zeitlimit(_) | Self::Verbindung(_) | Self::Getrennt(_)
        )
    }
}
