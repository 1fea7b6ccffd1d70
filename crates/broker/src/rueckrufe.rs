//! Rueckruf-Schnittstelle fuer die einbettende Anwendung
//!
//! Statt optionaler Callback-Felder stellt der Broker einen kleinen
//! Faehigkeits-Vertrag bereit: jede Methode hat eine leere
//! Standard-Implementierung, der Einbettende ueberschreibt nur was er
//! braucht. `NoopRueckrufe` steht ein wenn gar nichts gebraucht wird.

use switchboard_protocol::Nachricht;

use crate::registry::ClientRecord;

/// Einhaenge-Punkte des Brokers
///
/// Alle Methoden werden aus Verbindungs-Tasks heraus aufgerufen und
/// muessen deshalb schnell zurueckkehren; lange Arbeit gehoert in einen
/// eigenen Task.
pub trait BrokerRueckrufe: Send + Sync {
    /// Eine gueltige Nachricht wurde von einem Client empfangen
    fn nachricht_empfangen(&self, _nachricht: &Nachricht) {}

    /// Der Server wurde gestoppt (Accept-Loop beendet)
    fn server_gestoppt(&self) {}

    /// Eine neue Verbindung wurde akzeptiert
    fn client_verbunden(&self, _client: &ClientRecord) {}

    /// Ein Client hat sich erfolgreich angemeldet
    fn client_angemeldet(&self, _client: &ClientRecord) {}

    /// Ein Client wurde geraeumt (Verbindung beendet)
    fn client_getrennt(&self, _client: &ClientRecord) {}

    /// Freitext-Logmeldung des Brokers
    fn log_nachricht(&self, _text: &str) {}
}

/// Standard-Implementierung die alle Ereignisse verwirft
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRueckrufe;

impl BrokerRueckrufe for NoopRueckrufe {}
