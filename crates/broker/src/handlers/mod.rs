//! Handler-Module des Nachrichten-Verarbeiters

pub mod auth_handler;
pub mod channel_handler;
pub mod client_handler;
pub mod nachricht_handler;
