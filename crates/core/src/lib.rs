//! switchboard-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Switchboard-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SwitchboardError};
pub use types::{ChannelGuid, ClientGuid, MessageId, SERVER_GUID};
