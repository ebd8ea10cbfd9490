//! Raum-Mitgliedschaft – Welche Verbindungen sind in welchem Raum
//!
//! Mitgliedschaft ist transportbezogen (nach Handle), nicht nach Identitaet.
//! Ein Handle darf mehreren Raeumen gleichzeitig angehoeren; Beitreten
//! entfernt es nicht aus frueheren Raeumen. Leere Raeume werden beim
//! Entfernen des letzten Mitglieds aufgeraeumt.

use sprechstunde_core::{ConnectionId, RoomKey};
use sprechstunde_protocol::ServerEvent;
use std::collections::{HashMap, HashSet};

use crate::broadcast::EventBroadcaster;

/// Raum-Mitgliedschaften aller Verbindungen
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// Raum -> Mitglieder
    mitglieder: HashMap<RoomKey, HashSet<ConnectionId>>,
    /// Handle -> Raeume (Rueckindex fuer das Trennen)
    raeume_von: HashMap<ConnectionId, HashSet<RoomKey>>,
}

impl RoomMembership {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt `verbindung` dem Raum hinzu
    ///
    /// Idempotent. Gibt `true` zurueck wenn das Handle neu im Raum ist.
    pub fn beitreten(&mut self, raum: &RoomKey, verbindung: ConnectionId) -> bool {
        let neu = self
            .mitglieder
            .entry(raum.clone())
            .or_default()
            .insert(verbindung);
        self.raeume_von
            .entry(verbindung)
            .or_default()
            .insert(raum.clone());
        neu
    }

    /// Sendet `nachricht` an alle Mitglieder von `raum` ausser `ausgeschlossen`
    ///
    /// Fire-and-forget pro Mitglied: ein fehlgeschlagenes Einreihen bricht die
    /// Zustellung an die uebrigen Mitglieder nicht ab. Leere oder unbekannte
    /// Raeume sind ein No-op. Gibt die Anzahl erfolgreicher Zustellungen zurueck.
    pub fn broadcast_ausser(
        &self,
        raum: &RoomKey,
        ausgeschlossen: &ConnectionId,
        nachricht: &ServerEvent,
        broadcaster: &EventBroadcaster,
    ) -> usize {
        let Some(mitglieder) = self.mitglieder.get(raum) else {
            return 0;
        };

        mitglieder
            .iter()
            .filter(|v| *v != ausgeschlossen)
            .filter(|v| broadcaster.an_client_senden(v, nachricht.clone()))
            .count()
    }

    /// Entfernt `verbindung` aus allen Raeumen
    ///
    /// Gibt die Raeume zurueck, aus denen das Handle entfernt wurde.
    pub fn aus_allen_entfernen(&mut self, verbindung: &ConnectionId) -> Vec<RoomKey> {
        let Some(raeume) = self.raeume_von.remove(verbindung) else {
            return Vec::new();
        };

        for raum in &raeume {
            if let Some(mitglieder) = self.mitglieder.get_mut(raum) {
                mitglieder.remove(verbindung);
                if mitglieder.is_empty() {
                    self.mitglieder.remove(raum);
                }
            }
        }

        raeume.into_iter().collect()
    }

    /// Mitglieder eines Raums (leer bei unbekanntem Raum)
    pub fn mitglieder(&self, raum: &RoomKey) -> Vec<ConnectionId> {
        self.mitglieder
            .get(raum)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Raeume denen `verbindung` angehoert
    pub fn raeume_von(&self, verbindung: &ConnectionId) -> Vec<RoomKey> {
        self.raeume_von
            .get(verbindung)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Alle Handles die mindestens einem Raum angehoeren
    pub fn verbindungen(&self) -> impl Iterator<Item = &ConnectionId> {
        self.raeume_von.keys()
    }

    /// Anzahl nicht-leerer Raeume
    pub fn raum_anzahl(&self) -> usize {
        self.mitglieder.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
