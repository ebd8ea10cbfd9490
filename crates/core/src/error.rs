//! Fehlertypen fuer Sprechstunde
//!
//! Zentraler Fehler-Enum fuer alle crate-uebergreifenden Fehlerzustaende.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Sprechstunde
pub type Result<T> = std::result::Result<T, SprechstundeError>;

/// Alle moeglichen Fehler im Sprechstunde-System
#[derive(Debug, Error)]
pub enum SprechstundeError {
    // --- Adressierung ---
    #[error("Ungueltiges Verbindungs-Handle: {0}")]
    UngueltigeVerbindung(String),

    #[error("Ungueltiger {art}-Schluessel: {grund}")]
    UngueltigerSchluessel { art: &'static str, grund: String },

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl SprechstundeError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler vom Client verursacht wurde
    ///
    /// Solche Fehler fuehren nur zum Verwerfen der einzelnen Nachricht.
    pub fn ist_client_fehler(&self) -> bool {
        matches!(
            self,
            Self::UngueltigeVerbindung(_)
                | Self::UngueltigerSchluessel { .. }
                | Self::UngueltigeNachricht(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = SprechstundeError::UngueltigeNachricht("kein JSON".into());
        assert_eq!(e.to_string(), "Ungueltige Nachricht: kein JSON");
    }

    #[test]
    fn schluessel_fehler_anzeige() {
        let e = SprechstundeError::UngueltigerSchluessel {
            art: "Raum",
            grund: "leer".into(),
        };
        assert_eq!(e.to_string(), "Ungueltiger Raum-Schluessel: leer");
    }

    #[test]
    fn client_fehler_erkennung() {
        assert!(SprechstundeError::UngueltigeVerbindung("x".into()).ist_client_fehler());
        assert!(!SprechstundeError::konfiguration("port").ist_client_fehler());
    }
}
