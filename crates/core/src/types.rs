//! Gemeinsame Identifikationstypen fuer Switchboard
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Die inneren
//! Werte sind Strings: das Protokoll erlaubt vom Client gewaehlte
//! Kennungen, verglichen wird textuell.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reservierte Kennung des Servers selbst (Nil-UUID)
pub const SERVER_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// Eindeutige Client-Kennung
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientGuid(pub String);

impl ClientGuid {
    /// Erstellt eine neue zufaellige ClientGuid
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Gibt die reservierte Server-Kennung zurueck
    pub fn server() -> Self {
        Self(SERVER_GUID.to_string())
    }

    /// Prueft ob diese Kennung den Server selbst bezeichnet
    pub fn ist_server(&self) -> bool {
        self.0 == SERVER_GUID
    }

    /// Prueft ob die Kennung leer ist
    pub fn ist_leer(&self) -> bool {
        self.0.is_empty()
    }

    /// Gibt die Kennung als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientGuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Eindeutige Kanal-Kennung
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelGuid(pub String);

impl ChannelGuid {
    /// Erstellt eine neue zufaellige ChannelGuid
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Prueft ob die Kennung leer ist
    pub fn ist_leer(&self) -> bool {
        self.0.is_empty()
    }

    /// Gibt die Kennung als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChannelGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelGuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Eindeutige Nachrichten-Kennung fuer Request/Response-Korrelation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Erstellt eine neue zufaellige MessageId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Gibt die Kennung als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
