//! Handler fuer alle Client-Ereignisse
//!
//! Jeder Handler ist fuer einen bestimmten Ereignistyp zustaendig
//! und hat Zugriff auf den gemeinsamen SignalingState.

pub mod call_handler;
pub mod room_handler;
