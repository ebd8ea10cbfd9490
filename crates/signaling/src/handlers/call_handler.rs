//! Call-Handler – Offer, Answer und Neuverhandlung
//!
//! Alle vier Nachrichten sind gezielt: sie gehen unveraendert an genau ein
//! Handle (`to`), ergaenzt um das Absender-Handle (`from`). Der Inhalt von
//! Offer und Answer wird nie interpretiert.
//!
//! | Eingehend            | Ausgehend an `to`     |
//! |----------------------|-----------------------|
//! | `call:offer`         | `incoming:call`       |
//! | `call:accepted`      | `call:accepted`       |
//! | `negotiation:needed` | `negotiation:needed`  |
//! | `negotiation:done`   | `negotiation:final`   |
//!
//! Jede Funktion gibt zurueck ob die Nachricht eingereiht wurde.

use sprechstunde_core::ConnectionId;
use sprechstunde_protocol::{AnswerPayload, OfferPayload, ServerEvent};
use std::sync::Arc;

use crate::server_state::SignalingState;

pub fn handle_call_offer(
    payload: OfferPayload,
    von: ConnectionId,
    state: &Arc<SignalingState>,
) -> bool {
    let OfferPayload { to, offer } = payload;
    weiterleiten(state, von, to, ServerEvent::IncomingCall { from: von, offer })
}

pub fn handle_call_accepted(
    payload: AnswerPayload,
    von: ConnectionId,
    state: &Arc<SignalingState>,
) -> bool {
    let AnswerPayload { to, answer } = payload;
    weiterleiten(state, von, to, ServerEvent::CallAccepted { from: von, answer })
}

pub fn handle_negotiation_needed(
    payload: OfferPayload,
    von: ConnectionId,
    state: &Arc<SignalingState>,
) -> bool {
    let OfferPayload { to, offer } = payload;
    weiterleiten(
        state,
        von,
        to,
        ServerEvent::NegotiationNeeded { from: von, offer },
    )
}

pub fn handle_negotiation_done(
    payload: AnswerPayload,
    von: ConnectionId,
    state: &Arc<SignalingState>,
) -> bool {
    let AnswerPayload { to, answer } = payload;
    weiterleiten(
        state,
        von,
        to,
        ServerEvent::NegotiationFinal { from: von, answer },
    )
}

fn weiterleiten(
    state: &Arc<SignalingState>,
    von: ConnectionId,
    an: ConnectionId,
    nachricht: ServerEvent,
) -> bool {
    let event = nachricht.name();
    let zugestellt = state.relay.weiterleiten(&an, nachricht);
    if zugestellt {
        tracing::debug!(von = %von, an = %an, event, "Nachricht weitergeleitet");
    } else {
        tracing::debug!(von = %von, an = %an, event, "Ziel nicht erreichbar – Nachricht verworfen");
    }
    zugestellt
}
