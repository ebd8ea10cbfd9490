//! Connection-Registry – Identitaet <-> Verbindungs-Handle
//!
//! Bidirektionale Zuordnung zwischen der vom Client behaupteten Identitaet
//! und dem aktuellen Verbindungs-Handle. Pro Identitaet ist hoechstens ein
//! Handle gebunden, eine spaetere Bindung ueberschreibt die fruehere
//! (last-writer-wins). Die alte Verbindung wird dabei nicht geschlossen.
//!
//! Die Registry selbst ist nicht synchronisiert. Sie lebt im
//! `RelayZustand` hinter dem einen Relay-Lock.

use sprechstunde_core::{ClientIdentity, ConnectionId};
use std::collections::HashMap;

/// Bidirektionale Identitaets-Registry
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Identitaet -> aktuelles Handle
    nach_identitaet: HashMap<ClientIdentity, ConnectionId>,
    /// Handle -> gebundene Identitaet
    nach_verbindung: HashMap<ConnectionId, ClientIdentity>,
}

impl ConnectionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Bindet `identitaet` an `verbindung`
    ///
    /// Gibt das Handle zurueck das vorher unter dieser Identitaet gebunden
    /// war, falls es ein anderes war. War `verbindung` vorher an eine andere
    /// Identitaet gebunden, wird diese Bindung ebenfalls aufgeloest.
    pub fn binden(
        &mut self,
        identitaet: ClientIdentity,
        verbindung: ConnectionId,
    ) -> Option<ConnectionId> {
        // Alte Identitaet dieses Handles loesen
        if let Some(alte_identitaet) = self.nach_verbindung.remove(&verbindung) {
            if alte_identitaet != identitaet
                && self.nach_identitaet.get(&alte_identitaet) == Some(&verbindung)
            {
                self.nach_identitaet.remove(&alte_identitaet);
            }
        }

        let ersetzt = self
            .nach_identitaet
            .insert(identitaet.clone(), verbindung)
            .filter(|alt| *alt != verbindung);

        // Rueckrichtung der ersetzten Verbindung entfernen
        if let Some(alt) = ersetzt {
            self.nach_verbindung.remove(&alt);
            tracing::debug!(
                identitaet = %identitaet,
                alt = %alt,
                neu = %verbindung,
                "Identitaet neu gebunden"
            );
        }

        self.nach_verbindung.insert(verbindung, identitaet);
        ersetzt
    }

    /// Gibt die an `verbindung` gebundene Identitaet zurueck
    pub fn identitaet_von(&self, verbindung: &ConnectionId) -> Option<&ClientIdentity> {
        self.nach_verbindung.get(verbindung)
    }

    /// Gibt das aktuell an `identitaet` gebundene Handle zurueck
    pub fn verbindung_von(&self, identitaet: &ClientIdentity) -> Option<ConnectionId> {
        self.nach_identitaet.get(identitaet).copied()
    }

    /// Entfernt beide Richtungen der Bindung dieses Handles
    ///
    /// Eine inzwischen neuere Bindung derselben Identitaet an ein anderes
    /// Handle bleibt bestehen. No-op wenn das Handle nicht gebunden ist.
    pub fn entbinden(&mut self, verbindung: &ConnectionId) -> Option<ClientIdentity> {
        let identitaet = self.nach_verbindung.remove(verbindung)?;
        if self.nach_identitaet.get(&identitaet) == Some(verbindung) {
            self.nach_identitaet.remove(&identitaet);
        }
        Some(identitaet)
    }

    /// Anzahl gebundener Identitaeten
    pub fn anzahl(&self) -> usize {
        self.nach_identitaet.len()
    }

    /// Alle Handles mit gebundener Identitaet
    pub fn gebundene_verbindungen(&self) -> impl Iterator<Item = &ConnectionId> {
        self.nach_verbindung.keys()
    }

    /// Prueft die Zwei-Wege-Konsistenz (nur fuer Tests und Debug-Assertions)
    pub fn ist_konsistent(&self) -> bool {
        self.nach_identitaet.len() == self.nach_verbindung.len()
            && self
                .nach_identitaet
                .iter()
                .all(|(id, v)| self.nach_verbindung.get(v) == Some(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
