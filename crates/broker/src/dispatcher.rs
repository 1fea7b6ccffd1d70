//! Nachrichten-Verarbeiter – Routet Envelopes an die richtigen Handler
//!
//! Der Verarbeiter empfaengt dekodierte Nachrichten von einer
//! ClientConnection, bestimmt den richtigen Handler und gibt die
//! direkte Antwort zurueck. Zustellungen an Dritte (Relay, Fan-out,
//! Ereignisse) laufen ueber deren Send-Queues und nie ueber den
//! Rueckgabewert.
//!
//! ## Kommando-Tabelle
//! | Kommando | Handler |
//! |---|---|
//! | Echo, Login | auth_handler |
//! | Join/Leave/Create/Delete/List-Kanaele | channel_handler |
//! | ListClients, IsClientConnected | client_handler |
//! | (kein Kommando) | nachricht_handler (Direkt/Kanal-Zustellung) |
//! | HeartbeatRequest | stillschweigend konsumiert |

use std::net::SocketAddr;
use std::sync::Arc;

use switchboard_core::ClientGuid;
use switchboard_protocol::{status, Befehl, Nachricht};

use crate::handlers::{auth_handler, channel_handler, client_handler, nachricht_handler};
use crate::server_state::BrokerState;

/// Verbindungs-Kontext des Verarbeiters
pub struct DispatcherKontext {
    /// Quell-Adresse der Verbindung
    pub adresse: SocketAddr,
    /// Angemeldete Kennung (None vor dem Login)
    pub guid: Option<ClientGuid>,
    /// Wird vom Login-Handler gesetzt; der Verbindungs-Task verschickt
    /// erst die Antwort und veroeffentlicht danach die Ereignisse
    pub frisch_angemeldet: bool,
}

impl DispatcherKontext {
    /// Erstellt einen frischen Kontext fuer eine neue Verbindung
    pub fn neu(adresse: SocketAddr) -> Self {
        Self {
            adresse,
            guid: None,
            frisch_angemeldet: false,
        }
    }
}

/// Zentraler Nachrichten-Verarbeiter
pub struct NachrichtenVerarbeiter {
    state: Arc<BrokerState>,
}

impl NachrichtenVerarbeiter {
    /// Erstellt einen neuen Verarbeiter
    pub fn neu(state: Arc<BrokerState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende Nachricht und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine direkte Antwort an den Absender
    /// gehen soll (Heartbeats, unterdrueckte Bestaetigungen).
    pub async fn verarbeiten(
        &self,
        nachricht: Nachricht,
        ctx: &mut DispatcherKontext,
    ) -> Option<Nachricht> {
        if !nachricht.ist_gueltig() {
            tracing::debug!(adresse = %ctx.adresse, "Ungueltige Nachricht");
            return Some(Nachricht::fehler_antwort(
                &nachricht,
                status::UNGUELTIGE_NACHRICHT,
            ));
        }

        self.state.rueckrufe.nachricht_empfangen(&nachricht);

        match nachricht.befehl() {
            // ---------------------------------------------------------------
            // Anmeldung & Diagnose
            // ---------------------------------------------------------------
            Some(Befehl::Login) => {
                Some(auth_handler::login(nachricht, ctx, &self.state).await)
            }
            Some(Befehl::Echo) => Some(auth_handler::echo(nachricht)),

            // Heartbeats werden stillschweigend konsumiert
            Some(Befehl::HeartbeatRequest) => None,

            // ---------------------------------------------------------------
            // Kanal-Kommandos
            // ---------------------------------------------------------------
            Some(Befehl::JoinChannel) => {
                Some(channel_handler::beitreten(nachricht, ctx, &self.state).await)
            }
            Some(Befehl::LeaveChannel) => {
                Some(channel_handler::verlassen(nachricht, ctx, &self.state).await)
            }
            Some(Befehl::CreateChannel) => {
                Some(channel_handler::erstellen(nachricht, ctx, &self.state).await)
            }
            Some(Befehl::DeleteChannel) => {
                Some(channel_handler::loeschen(nachricht, ctx, &self.state).await)
            }
            Some(Befehl::ListChannels) => {
                Some(channel_handler::auflisten(nachricht, ctx, &self.state).await)
            }
            Some(Befehl::ListChannelSubscribers) => {
                Some(channel_handler::abonnenten_auflisten(nachricht, &self.state).await)
            }

            // ---------------------------------------------------------------
            // Client-Kommandos
            // ---------------------------------------------------------------
            Some(Befehl::ListClients) => {
                Some(client_handler::auflisten(nachricht, &self.state).await)
            }
            Some(Befehl::IsClientConnected) => {
                Some(client_handler::ist_verbunden(nachricht, &self.state).await)
            }

            // ---------------------------------------------------------------
            // Unbekannte Kommandos
            // ---------------------------------------------------------------
            Some(Befehl::Unbekannt(name)) => {
                tracing::debug!(adresse = %ctx.adresse, kommando = %name, "Unbekanntes Kommando");
                Some(Nachricht::fehler_antwort(
                    &nachricht,
                    status::UNBEKANNTES_KOMMANDO,
                ))
            }

            // ---------------------------------------------------------------
            // Nutzlast: Direkt-Zustellung oder Kanal-Fan-out
            // ---------------------------------------------------------------
            None => nachricht_handler::weiterleiten(nachricht, &self.state).await,
        }
    }
}
