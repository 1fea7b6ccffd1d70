//! switchboard-broker – TCP/TLS Nachrichten-Ebene
//!
//! Dieser Crate implementiert den Kern des Switchboard-Brokers: er
//! verwaltet TCP/TLS-Verbindungen, die Anmeldung, Kanaele und die
//! Zustellung von Direkt- und Kanal-Nachrichten.
//!
//! ## Architektur
//!
//! ```text
//! TCP/TLS Listener (BrokerServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Login-Gate: ohne Anmeldung nur das Login-Kommando
//!     |  Herzschlag: periodische HeartbeatRequests, Raeumung nach N Fehlern
//!     |
//!     v
//! NachrichtenVerarbeiter
//!     |
//!     +-- auth_handler      (Login, Echo)
//!     +-- channel_handler   (Join, Leave, Create, Delete, Listen)
//!     +-- client_handler    (ListClients, IsClientConnected)
//!     +-- nachricht_handler (Direkt-Zustellung, Kanal-Fan-out)
//!
//! Registry          – einzige Autoritaet ueber Clients und Kanaele
//! EreignisVerteiler – systemgenerierte Benachrichtigungen verteilen
//! BrokerRueckrufe   – Einhaenge-Punkte fuer die einbettende Anwendung
//! ```

pub mod broadcast;
pub mod dispatcher;
pub mod ereignis;
pub mod error;
pub mod handlers;
pub mod herzschlag;
pub mod registry;
pub mod rueckrufe;
pub mod server_state;
pub mod tcp;
pub mod verbindung;

// Bequeme Re-Exporte
pub use broadcast::ClientSender;
pub use dispatcher::{DispatcherKontext, NachrichtenVerarbeiter};
pub use error::{BrokerError, BrokerResult};
pub use registry::{ClientRecord, KanalRecord, Registry};
pub use rueckrufe::{BrokerRueckrufe, NoopRueckrufe};
pub use server_state::{BrokerKonfig, BrokerState};
pub use tcp::BrokerServer;
pub use verbindung::ClientConnection;
