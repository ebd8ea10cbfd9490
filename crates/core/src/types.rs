//! Gemeinsame Identifikationstypen fuer Sprechstunde
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Verbindungs-Handle, Identitaet und Raum zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SprechstundeError;

/// Maximale Laenge einer Identitaet oder eines Raum-Schluessels in Bytes
pub const MAX_SCHLUESSEL_LAENGE: usize = 256;

/// Opakes Handle einer einzelnen Transport-Verbindung
///
/// Wird ausschliesslich von der Transportschicht beim Verbindungsaufbau
/// vergeben. Der Relay speichert und vergleicht es nur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = SprechstundeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SprechstundeError::UngueltigeVerbindung(s.to_string()))
    }
}

/// Prueft einen Schluessel-String (nicht leer, begrenzte Laenge)
fn schluessel_pruefen(art: &'static str, wert: String) -> Result<String, SprechstundeError> {
    if wert.trim().is_empty() {
        return Err(SprechstundeError::UngueltigerSchluessel {
            art,
            grund: "leer".into(),
        });
    }
    if wert.len() > MAX_SCHLUESSEL_LAENGE {
        return Err(SprechstundeError::UngueltigerSchluessel {
            art,
            grund: format!("laenger als {MAX_SCHLUESSEL_LAENGE} Bytes"),
        });
    }
    Ok(wert)
}

/// Vom Client behauptete Identitaet (z.B. E-Mail-Adresse)
///
/// Wird vom Relay nicht verifiziert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Erstellt eine Identitaet, leere Werte werden abgelehnt
    pub fn neu(wert: impl Into<String>) -> Result<Self, SprechstundeError> {
        schluessel_pruefen("Identitaet", wert.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientIdentity {
    type Error = SprechstundeError;

    fn try_from(wert: String) -> Result<Self, Self::Error> {
        Self::neu(wert)
    }
}

impl From<ClientIdentity> for String {
    fn from(id: ClientIdentity) -> Self {
        id.0
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaker Raum-Schluessel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomKey(String);

impl RoomKey {
    /// Erstellt einen Raum-Schluessel, leere Werte werden abgelehnt
    pub fn neu(wert: impl Into<String>) -> Result<Self, SprechstundeError> {
        schluessel_pruefen("Raum", wert.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomKey {
    type Error = SprechstundeError;

    fn try_from(wert: String) -> Result<Self, Self::Error> {
        Self::neu(wert)
    }
}

impl From<RoomKey> for String {
    fn from(raum: RoomKey) -> Self {
        raum.0
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
