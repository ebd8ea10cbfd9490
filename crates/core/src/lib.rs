//! sprechstunde-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Sprechstunde-Crates gemeinsam genutzt werden: Verbindungs-IDs,
//! Client-Identitaeten, Raum-Schluessel und der zentrale Fehler-Enum.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SprechstundeError};
pub use types::{ClientIdentity, ConnectionId, RoomKey};
