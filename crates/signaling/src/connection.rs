//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede WebSocket-Verbindung bekommt eine `ClientConnection` in einem
//! eigenen tokio-Task. Eingehende Textframes gehen an den Dispatcher,
//! ausgehende Ereignisse kommen aus der Send-Queue der Verbindung.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Kommt `verbindungs_timeout_sek` lang kein Frame, wird getrennt
//! - Pings des Clients beantwortet die WebSocket-Bibliothek selbst
//!
//! Am Ende laeuft immer das Trennen des Lebenszyklus, auch beim Shutdown.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use sprechstunde_core::ConnectionId;
use sprechstunde_protocol::{Dialekt, ServerEvent};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::lifecycle::Lebenszyklus;
use crate::server_state::SignalingState;

/// Close-Code "Going Away" (RFC 6455)
const CLOSE_GOING_AWAY: u16 = 1001;
/// Close-Code "Try Again Later" (RFC 6455)
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    verbindung: ConnectionId,
    peer_addr: Option<SocketAddr>,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischem Handle
    pub fn neu(state: Arc<SignalingState>, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            state,
            verbindung: ConnectionId::new(),
            peer_addr,
        }
    }

    pub fn verbindung(&self) -> ConnectionId {
        self.verbindung
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt, der Timeout greift oder ein
    /// Shutdown-Signal eingeht.
    pub async fn verarbeiten(self, mut socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let verbindung = self.verbindung;
        let peer = self.peer_addr.map(|a| a.to_string()).unwrap_or_default();

        let (lebenszyklus, mut sende_rx) =
            match Lebenszyklus::verbunden(self.state.relay.clone(), verbindung) {
                Ok(ergebnis) => ergebnis,
                Err(e) => {
                    tracing::warn!(peer = %peer, fehler = %e, "Verbindung abgelehnt");
                    let _ = socket
                        .send(schliessen(CLOSE_TRY_AGAIN_LATER, e.to_string()))
                        .await;
                    return;
                }
            };
        tracing::debug!(verbindung = %verbindung, peer = %peer, "WebSocket-Verbindung aufgebaut");

        let mut ctx =
            DispatcherContext::neu(lebenszyklus, self.state.config.nachrichten_pro_minute);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        self.schleife(&mut socket, &mut sende_rx, &mut ctx, &dispatcher, &mut shutdown_rx)
            .await;

        // Cleanup beim Verbindungsende
        ctx.lebenszyklus.trennen();
        tracing::debug!(verbindung = %verbindung, "Verbindungs-Task beendet");
    }

    async fn schleife(
        &self,
        socket: &mut WebSocket,
        sende_rx: &mut mpsc::Receiver<ServerEvent>,
        ctx: &mut DispatcherContext,
        dispatcher: &MessageDispatcher,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let verbindung = self.verbindung;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        let mut keepalive =
            tokio::time::interval_at(Instant::now() + keepalive_intervall, keepalive_intervall);
        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();

        if *shutdown_rx.borrow() {
            let _ = socket
                .send(schliessen(CLOSE_GOING_AWAY, "Server wird heruntergefahren"))
                .await;
            return;
        }

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = socket.recv() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            match nachricht {
                                Message::Text(text) => {
                                    if let Some(antwort) = dispatcher.dispatch(&text, ctx) {
                                        if !senden(socket, verbindung, &antwort, ctx.dialekt).await {
                                            break;
                                        }
                                    }
                                }
                                Message::Binary(daten) => {
                                    tracing::debug!(
                                        verbindung = %verbindung,
                                        bytes = daten.len(),
                                        "Binary-Frame ignoriert"
                                    );
                                }
                                Message::Ping(_) | Message::Pong(_) => {
                                    tracing::trace!(verbindung = %verbindung, "Ping/Pong empfangen");
                                }
                                Message::Close(_) => {
                                    tracing::debug!(verbindung = %verbindung, "Close-Frame vom Client");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(verbindung = %verbindung, fehler = %e, "WebSocket-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::debug!(verbindung = %verbindung, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehendes Ereignis aus der Send-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if !senden(socket, verbindung, &ausgehend, ctx.dialekt).await {
                        break;
                    }
                }

                // Keepalive-Ping und Timeout-Pruefung
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(verbindung = %verbindung, "Verbindungs-Timeout");
                        let _ = socket
                            .send(schliessen(CLOSE_GOING_AWAY, "Zeitueberschreitung"))
                            .await;
                        break;
                    }
                    if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
                        tracing::warn!(verbindung = %verbindung, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(verbindung = %verbindung, "Shutdown-Signal – Verbindung wird getrennt");
                        let _ = socket
                            .send(schliessen(CLOSE_GOING_AWAY, "Server wird heruntergefahren"))
                            .await;
                        break;
                    }
                }
            }
        }
    }
}

/// Serialisiert ein Ereignis im Dialekt des Empfaengers und sendet es als Textframe
///
/// Gibt `false` zurueck wenn der Transport nicht mehr beschreibbar ist.
async fn senden(
    socket: &mut WebSocket,
    verbindung: ConnectionId,
    ereignis: &ServerEvent,
    dialekt: Dialekt,
) -> bool {
    let json = match ereignis.to_json_im_dialekt(dialekt) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(verbindung = %verbindung, fehler = %e, "Serialisierung fehlgeschlagen");
            return true;
        }
    };
    match socket.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(verbindung = %verbindung, fehler = %e, "Senden fehlgeschlagen");
            false
        }
    }
}

fn schliessen(code: u16, grund: impl Into<String>) -> Message {
    let grund: String = grund.into();
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Owned(grund),
    }))
}
