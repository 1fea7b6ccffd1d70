//! Client-Verbindung – Verwaltet eine einzelne TCP/TLS-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task ist der einzige Schreiber auf dem Socket:
//! direkte Antworten schreibt er selbst, alles andere (Relays,
//! Ereignisse, Fan-out) kommt ueber die Send-Queue herein.
//!
//! ## Ablauf
//! 1. Frame lesen; undekodierbare Frames werden geloggt und uebersprungen
//! 2. Login-Gate: ohne angemeldete Kennung ist nur das Login-Kommando
//!    erlaubt, alles andere beantwortet `login-required`
//! 3. Dispatch in den NachrichtenVerarbeiter, Antwort direkt schreiben
//!
//! ## Raeumung
//! Ausgeloest durch Stream-Ende, Schreibfehler, Herzschlag-Limit oder
//! Shutdown. Entfernt den Client aus der Registry, loest seine Kanaele
//! auf (mit Benachrichtigung), traegt ihn ueberall als Abonnent aus und
//! meldet den Server-Austritt. Die Raeumung ist idempotent: wer den
//! Registry-Eintrag nicht mehr vorfindet, tut nichts.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::codec::Framed;

use switchboard_protocol::{status, Befehl, Dekodiert, FrameCodec, Nachricht};

use crate::dispatcher::{DispatcherKontext, NachrichtenVerarbeiter};
use crate::ereignis;
use crate::herzschlag::HerzschlagPlan;
use crate::server_state::BrokerState;

/// Frist fuer gewoehnliche Schreibvorgaenge (Antworten, Relays)
const SCHREIB_FRIST: Duration = Duration::from_secs(10);

/// Schlaf-Dauer wenn der Herzschlag deaktiviert ist
const LANGE_PAUSE: Duration = Duration::from_secs(3600);

/// Verarbeitet eine einzelne TCP/TLS-Verbindung
///
/// Generisch ueber den Stream-Typ: TcpStream und TLS-Stream laufen
/// durch denselben Code.
pub struct ClientConnection {
    state: Arc<BrokerState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<BrokerState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung endet, ein Schreibfehler auftritt,
    /// das Herzschlag-Limit reisst oder das Shutdown-Signal eingeht.
    pub async fn verarbeiten<S>(
        self,
        stream: S,
        mut sende_rx: mpsc::Receiver<Nachricht>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(
            stream,
            FrameCodec::with_max_size(self.state.konfig.max_frame_groesse),
        );
        let verarbeiter = NachrichtenVerarbeiter::neu(Arc::clone(&self.state));
        let mut ctx = DispatcherKontext::neu(peer_addr);
        let mut herzschlag = HerzschlagPlan::neu(
            self.state.konfig.herzschlag_intervall_ms,
            self.state.konfig.herzschlag_max_fehler,
        );
        let mut naechster_schlag = Instant::now() + herzschlag.intervall().unwrap_or(LANGE_PAUSE);

        loop {
            let jetzt = Instant::now();
            let schlaf = if jetzt < naechster_schlag {
                naechster_schlag - jetzt
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehender Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(Dekodiert::Nachricht(nachricht))) => {
                            if !self
                                .nachricht_behandeln(nachricht, &mut framed, &verarbeiter, &mut ctx)
                                .await
                            {
                                break;
                            }
                        }
                        Some(Ok(Dekodiert::Fehlerhaft(grund))) => {
                            // Frame-Grenzen intakt – Verbindung bleibt offen
                            tracing::warn!(
                                peer = %peer_addr,
                                grund = %grund,
                                "Undekodierbarer Frame uebersprungen"
                            );
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Framing gebrochen");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                ausgehend = sende_rx.recv() => {
                    match ausgehend {
                        Some(nachricht) => {
                            if !sende_mit_frist(&mut framed, nachricht, SCHREIB_FRIST).await {
                                tracing::warn!(peer = %peer_addr, "Zustellung fehlgeschlagen");
                                break;
                            }
                        }
                        // Alle Sender weg: der Registry-Eintrag wurde ersetzt
                        None => {
                            tracing::debug!(peer = %peer_addr, "Send-Queue verwaist");
                            break;
                        }
                    }
                }

                // Herzschlag-Takt
                _ = sleep(schlaf), if herzschlag.aktiv() => {
                    if Instant::now() >= naechster_schlag {
                        let geschrieben = sende_mit_frist(
                            &mut framed,
                            Nachricht::herzschlag(),
                            herzschlag.schreib_frist(),
                        )
                        .await;

                        if geschrieben {
                            herzschlag.erfolg_registrieren();
                        } else if herzschlag.fehler_registrieren() {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler_in_folge = herzschlag.fehler_in_folge(),
                                "Herzschlag-Limit erreicht – Verbindung wird geraeumt"
                            );
                            break;
                        }

                        if let Some(intervall) = herzschlag.intervall() {
                            naechster_schlag = Instant::now() + intervall;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        self.raeumen(&ctx).await;
    }

    /// Gate-Pruefung, Dispatch und Antwort fuer eine dekodierte Nachricht
    ///
    /// Gibt `false` zurueck wenn die Verbindung beendet werden muss.
    async fn nachricht_behandeln<S>(
        &self,
        nachricht: Nachricht,
        framed: &mut Framed<S, FrameCodec>,
        verarbeiter: &NachrichtenVerarbeiter,
        ctx: &mut DispatcherKontext,
    ) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Login-Gate: ohne bekannte Kennung nur das Login-Kommando
        if !matches!(nachricht.befehl(), Some(Befehl::Login)) {
            let unbekannt = match &nachricht.sender_guid {
                None => true,
                Some(guid) if guid.ist_leer() => true,
                Some(guid) if guid.ist_server() => false,
                Some(guid) => self.state.registry.client_nach_guid(guid).is_none(),
            };
            if unbekannt {
                tracing::debug!(peer = %self.peer_addr, "Anmeldung erforderlich");
                let antwort = Nachricht::fehler_antwort(&nachricht, status::LOGIN_ERFORDERLICH);
                return sende_mit_frist(framed, antwort, SCHREIB_FRIST).await;
            }
        }

        if let Some(antwort) = verarbeiter.verarbeiten(nachricht, ctx).await {
            if !sende_mit_frist(framed, antwort, SCHREIB_FRIST).await {
                tracing::warn!(peer = %self.peer_addr, "Senden der Antwort fehlgeschlagen");
                return false;
            }
        }

        // Erst die Login-Antwort, dann die Beitritts-Ereignisse
        if ctx.frisch_angemeldet {
            ctx.frisch_angemeldet = false;
            if let Some(record) = self.state.registry.client_nach_adresse(&self.peer_addr) {
                self.state.rueckrufe.client_angemeldet(&record);
            }
            if let Some(guid) = &ctx.guid {
                ereignis::server_beitritt_melden(&self.state, guid);
            }
        }

        true
    }

    /// Raeumt die Verbindung: Registry, Kanaele, Ereignisse, Rueckruf
    async fn raeumen(&self, ctx: &DispatcherKontext) {
        let Some(record) = self
            .state
            .registry
            .client_entfernen_nach_adresse(&self.peer_addr)
        else {
            // Bereits geraeumt oder durch Wiederanmeldung ersetzt
            tracing::debug!(peer = %self.peer_addr, "Raeumung ohne Registry-Eintrag");
            return;
        };

        if let Some(guid) = record.guid.clone().or_else(|| ctx.guid.clone()) {
            // Eigene Kanaele aufloesen und die Abonnenten benachrichtigen
            let geloeschte = self.state.registry.client_kanaele_entfernen(&guid);
            for (kanal, andere) in &geloeschte {
                ereignis::kanal_loeschung_melden(&self.state, kanal, andere);
            }
            // Aus fremden Kanaelen als Abonnent austragen
            self.state.registry.abonnent_ueberall_entfernen(&guid);

            if record.angemeldet {
                ereignis::server_austritt_melden(&self.state, &guid);
            }

            tracing::info!(
                peer = %self.peer_addr,
                guid = %guid,
                kanaele_aufgeloest = geloeschte.len(),
                "Client geraeumt"
            );
        } else {
            tracing::info!(peer = %self.peer_addr, "Nicht angemeldete Verbindung geraeumt");
        }

        self.state.rueckrufe.client_getrennt(&record);
    }
}

/// Schreibt eine Nachricht mit Frist
///
/// Laeuft die Frist ab, bleiben gepufferte Bytes im Framed-Buffer
/// erhalten; es geraet kein halbes Frame auf die Leitung.
async fn sende_mit_frist<S>(
    framed: &mut Framed<S, FrameCodec>,
    nachricht: Nachricht,
    frist: Duration,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(frist, framed.send(nachricht)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(fehler = %e, "Schreiben fehlgeschlagen");
            false
        }
        Err(_) => {
            tracing::debug!("Schreib-Frist ueberschritten");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
