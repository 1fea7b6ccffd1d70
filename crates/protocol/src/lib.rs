//! switchboard-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert den Nachrichten-Envelope, die Kommandos und
//! das Wire-Format (Laengen-Prefix + JSON) die zwischen Client und
//! Server ausgetauscht werden.

pub mod nachricht;
pub mod wire;

pub use nachricht::{
    status, Befehl, ClientInfo, EreignisDaten, EreignisTyp, KanalAnfrage, KanalInfo, Nachricht,
};
pub use wire::{Dekodiert, FrameCodec};
