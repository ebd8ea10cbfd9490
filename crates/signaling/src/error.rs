//! Fehlertypen fuer den Signaling-Service

use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Verbindung ist nicht (mehr) beim Relay registriert
    #[error("Verbindung nicht registriert")]
    NichtVerbunden,

    /// Server ist voll
    #[error("Server ist voll (max. {0} Verbindungen)")]
    ServerVoll(usize),
}

/// Result-Alias fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
