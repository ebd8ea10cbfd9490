//! Message-Dispatcher – Routet Client-Ereignisse an die richtigen Handler
//!
//! Der Dispatcher empfaengt Textframes einer ClientConnection, prueft das
//! Nachrichtenlimit, dekodiert den Umschlag und ruft den passenden Handler.
//!
//! ## Fehler
//! Kein Fehler ist fuer den Relay fatal. Ungueltige Nachrichten, Ziele ohne
//! Verbindung und gedrosselte Nachrichten werden verworfen und geloggt. Nur
//! mit `fehler_melden` erhaelt der Absender eine negative Bestaetigung.

use sprechstunde_core::ConnectionId;
use sprechstunde_protocol::{ereignis_name_lesen, ClientEvent, Dialekt, ErrorCode, ServerEvent};
use std::sync::Arc;

use crate::error::SignalingError;
use crate::handlers::{call_handler, room_handler};
use crate::lifecycle::Lebenszyklus;
use crate::rate_limit::NachrichtenLimit;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Zustand der aktuellen Verbindung
pub struct DispatcherContext {
    /// Lebenszyklus der Verbindung
    pub lebenszyklus: Lebenszyklus,
    /// Nachrichtenlimit der Verbindung
    pub limit: NachrichtenLimit,
    /// Namensschema fuer ausgehende Ereignisse; wechselt beim ersten
    /// alten Namen auf `Alt` und bleibt dort
    pub dialekt: Dialekt,
}

impl DispatcherContext {
    pub fn neu(lebenszyklus: Lebenszyklus, nachrichten_pro_minute: u32) -> Self {
        Self {
            lebenszyklus,
            limit: NachrichtenLimit::neu(nachrichten_pro_minute),
            dialekt: Dialekt::Kanonisch,
        }
    }

    pub fn verbindung(&self) -> ConnectionId {
        self.lebenszyklus.verbindung()
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet einen eingehenden Textframe
    ///
    /// Gibt eine negative Bestaetigung fuer den Absender zurueck, falls
    /// `fehler_melden` aktiv ist und die Nachricht nicht zugestellt wurde.
    /// Ereignisse fuer den Absender selbst (z.B. die Beitritts-Bestaetigung)
    /// laufen ueber seine Send-Queue, nicht ueber den Rueckgabewert.
    pub fn dispatch(&self, text: &str, ctx: &mut DispatcherContext) -> Option<ServerEvent> {
        let verbindung = ctx.verbindung();

        if ctx.lebenszyklus.ist_getrennt() {
            tracing::debug!(verbindung = %verbindung, "Nachricht nach Trennung ignoriert");
            return None;
        }

        if !ctx.limit.pruefen() {
            tracing::warn!(verbindung = %verbindung, "Nachrichtenlimit ueberschritten – Nachricht verworfen");
            return self.fehler_antwort(
                ErrorCode::RateLimited,
                "Nachrichtenlimit ueberschritten",
                ereignis_name_lesen(text),
            );
        }

        let event = match ClientEvent::aus_text_mit_dialekt(text) {
            Ok((event, dialekt)) => {
                if dialekt == Dialekt::Alt && ctx.dialekt != Dialekt::Alt {
                    tracing::debug!(verbindung = %verbindung, "Client verwendet alte Ereignisnamen");
                    ctx.dialekt = Dialekt::Alt;
                }
                event
            }
            Err(e) => {
                self.state.relay.ungueltig_zaehlen();
                let event_name = ereignis_name_lesen(text);
                tracing::warn!(
                    verbindung = %verbindung,
                    event = ?event_name,
                    fehler = %e,
                    "Ungueltige Nachricht verworfen"
                );
                return self.fehler_antwort(ErrorCode::InvalidMessage, e.to_string(), event_name);
            }
        };

        let name = event.name();
        tracing::trace!(verbindung = %verbindung, event = name, "Nachricht empfangen");

        let zugestellt = match event {
            ClientEvent::RoomJoin(payload) => {
                match room_handler::handle_room_join(payload, &mut ctx.lebenszyklus, &self.state) {
                    Ok(_) => true,
                    Err(SignalingError::NichtVerbunden) => {
                        tracing::debug!(verbindung = %verbindung, "Beitritt nach Trennung verworfen");
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(verbindung = %verbindung, fehler = %e, "Beitritt fehlgeschlagen");
                        return None;
                    }
                }
            }
            ClientEvent::CallOffer(payload) => {
                call_handler::handle_call_offer(payload, verbindung, &self.state)
            }
            ClientEvent::CallAccepted(payload) => {
                call_handler::handle_call_accepted(payload, verbindung, &self.state)
            }
            ClientEvent::NegotiationNeeded(payload) => {
                call_handler::handle_negotiation_needed(payload, verbindung, &self.state)
            }
            ClientEvent::NegotiationDone(payload) => {
                call_handler::handle_negotiation_done(payload, verbindung, &self.state)
            }
        };

        if zugestellt {
            None
        } else {
            self.fehler_antwort(
                ErrorCode::UnknownTarget,
                "Ziel ist nicht verbunden",
                Some(name.to_string()),
            )
        }
    }

    fn fehler_antwort(
        &self,
        code: ErrorCode,
        nachricht: impl Into<String>,
        event: Option<String>,
    ) -> Option<ServerEvent> {
        self.state
            .config
            .fehler_melden
            .then(|| ServerEvent::error(code, nachricht, event))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
