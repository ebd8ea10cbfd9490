//! sprechstunde-protocol – Nachrichten-Definitionen des Signaling-Relays
//!
//! Dieses Crate definiert den JSON-Umschlag `{event, payload}` und alle
//! Ereignisse die zwischen Browser-Client und Relay ausgetauscht werden.

pub mod signal;

pub use signal::{
    ereignis_name_lesen, AnswerPayload, ClientEvent, Dialekt, ErrorCode, ErrorPayload, OfferPayload,
    RoomJoinPayload, ServerEvent,
};
