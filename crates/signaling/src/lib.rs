//! sprechstunde-signaling – WebSocket-Signaling-Relay
//!
//! Dieser Crate vermittelt die Verbindungsaushandlung zwischen zwei
//! Browser-Clients einer Videosprechstunde. Er leitet Offer, Answer und
//! Neuverhandlungen zwischen benannten Verbindungen weiter, Medien laufen
//! nie ueber den Relay.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket-Listener (SignalingServer, axum)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Lebenszyklus: Verbunden -> Beigetreten -> Getrennt
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- RoomHandler  (room:join)
//!     +-- CallHandler  (call:offer, call:accepted, negotiation:*)
//!
//! SignalingRelay – ein Lock ueber:
//!     ConnectionRegistry – Identitaet <-> Handle
//!     RoomMembership     – Raum -> Handles
//!     EventBroadcaster   – Send-Queues pro Handle
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod server_state;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use lifecycle::{Lebenszyklus, VerbindungsZustand};
pub use registry::ConnectionRegistry;
pub use relay::{Beitritt, RelayOptionen, RelayStatistik, SignalingRelay, Trennung};
pub use rooms::RoomMembership;
pub use server_state::{SignalingConfig, SignalingState};
pub use ws::SignalingServer;
