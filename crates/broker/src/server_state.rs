//! Gemeinsamer Server-Zustand fuer den Broker
//!
//! Haelt Konfiguration, Registry und Rueckrufe als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use std::sync::Arc;
use std::time::Instant;

use switchboard_protocol::wire::DEFAULT_MAX_FRAME_SIZE;

use crate::registry::Registry;
use crate::rueckrufe::BrokerRueckrufe;

/// Konfiguration des Broker-Kerns
///
/// Der Loader (TOML-Datei, Umgebung) lebt im Server-Binary; der Kern
/// konsumiert nur dieses fertige Struct.
#[derive(Debug, Clone)]
pub struct BrokerKonfig {
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Sende-Bestaetigungen (send-success/send-failure) an Absender
    pub sende_bestaetigungen: bool,
    /// ServerJoin/ServerLeave-Ereignisse an andere Clients verteilen
    pub server_beitritt_ereignisse: bool,
    /// ChannelJoin/ChannelLeave-Ereignisse an andere Abonnenten verteilen
    pub kanal_ereignisse: bool,
    /// Herzschlag-Intervall in Millisekunden (0 = aus, sonst >= 100)
    pub herzschlag_intervall_ms: u64,
    /// Raeumung nach so vielen Schreibfehlern in Folge
    pub herzschlag_max_fehler: u32,
    /// Timeout fuer synchrone Anfragen in Millisekunden
    pub sync_timeout_ms: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for BrokerKonfig {
    fn default() -> Self {
        Self {
            max_clients: 512,
            sende_bestaetigungen: true,
            server_beitritt_ereignisse: true,
            kanal_ereignisse: true,
            herzschlag_intervall_ms: 30_000,
            herzschlag_max_fehler: 5,
            sync_timeout_ms: 10_000,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Gemeinsamer Broker-Zustand (thread-safe, Arc-geteilt)
pub struct BrokerState {
    /// Broker-Konfiguration (unveraenderlich nach dem Start)
    pub konfig: Arc<BrokerKonfig>,
    /// Einzige Autoritaet ueber Clients und Kanaele
    pub registry: Registry,
    /// Einhaenge-Punkte der einbettenden Anwendung
    pub rueckrufe: Arc<dyn BrokerRueckrufe>,
    /// Startzeitpunkt (fuer Uptime-Berechnung)
    pub start_zeit: Instant,
}

impl BrokerState {
    /// Erstellt einen neuen BrokerState
    pub fn neu(konfig: BrokerKonfig, rueckrufe: Arc<dyn BrokerRueckrufe>) -> Arc<Self> {
        Arc::new(Self {
            konfig: Arc::new(konfig),
            registry: Registry::neu(),
            rueckrufe,
            start_zeit: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_zeit.elapsed().as_secs()
    }
}
