//! Lebenszyklus einer Verbindung
//!
//! ## State Machine
//! ```text
//! Verbunden -> Beigetreten(raeume) -> Getrennt
//!     |                                  ^
//!     +----------------------------------+
//! ```
//!
//! `Verbunden` registriert nur die Send-Queue. `Getrennt` ist terminal:
//! Entbinden, Entfernen aus allen Raeumen und Schliessen der Queue laufen
//! atomar im Relay. Wird ein `Lebenszyklus` fallen gelassen ohne getrennt
//! worden zu sein (z.B. Task-Abbruch), trennt `Drop` die Verbindung.

use sprechstunde_core::{ConnectionId, RoomKey};
use sprechstunde_protocol::ServerEvent;
use std::collections::BTreeSet;
use tokio::sync::mpsc;

use crate::error::SignalingResult;
use crate::relay::{SignalingRelay, Trennung};

/// Zustand einer Verbindung aus Sicht des Relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Send-Queue registriert, noch keinem Raum beigetreten
    Verbunden,
    /// Mindestens einem Raum beigetreten
    Beigetreten { raeume: BTreeSet<RoomKey> },
    /// Alle Eintraege abgeraeumt (terminal)
    Getrennt,
}

/// Lebenszyklus einer einzelnen Verbindung
pub struct Lebenszyklus {
    verbindung: ConnectionId,
    zustand: VerbindungsZustand,
    relay: SignalingRelay,
}

impl Lebenszyklus {
    /// Transport-Ereignis "verbunden": registriert die Send-Queue
    pub fn verbunden(
        relay: SignalingRelay,
        verbindung: ConnectionId,
    ) -> SignalingResult<(Self, mpsc::Receiver<ServerEvent>)> {
        let empfang = relay.verbinden(verbindung)?;
        tracing::info!(verbindung = %verbindung, "Client verbunden");
        Ok((
            Self {
                verbindung,
                zustand: VerbindungsZustand::Verbunden,
                relay,
            },
            empfang,
        ))
    }

    pub fn verbindung(&self) -> ConnectionId {
        self.verbindung
    }

    pub fn zustand(&self) -> &VerbindungsZustand {
        &self.zustand
    }

    pub fn ist_getrennt(&self) -> bool {
        self.zustand == VerbindungsZustand::Getrennt
    }

    /// Vermerkt einen erfolgreichen Raum-Beitritt
    pub fn beigetreten(&mut self, raum: RoomKey) {
        match &mut self.zustand {
            zustand @ VerbindungsZustand::Verbunden => {
                *zustand = VerbindungsZustand::Beigetreten {
                    raeume: BTreeSet::from([raum]),
                };
            }
            VerbindungsZustand::Beigetreten { raeume } => {
                raeume.insert(raum);
            }
            VerbindungsZustand::Getrennt => {
                tracing::debug!(verbindung = %self.verbindung, "Beitritt nach Trennung ignoriert");
            }
        }
    }

    /// Transport-Ereignis "getrennt"
    ///
    /// Idempotent; nur der erste Aufruf raeumt ab.
    pub fn trennen(&mut self) -> Option<Trennung> {
        if self.ist_getrennt() {
            return None;
        }
        self.zustand = VerbindungsZustand::Getrennt;

        let trennung = self.relay.trennen(&self.verbindung);
        match &trennung {
            Some(t) => tracing::info!(
                verbindung = %self.verbindung,
                identitaet = ?t.identitaet.as_ref().map(|i| i.as_str()),
                raeume = t.raeume.len(),
                "Client getrennt"
            ),
            None => tracing::debug!(verbindung = %self.verbindung, "Client war bereits abgeraeumt"),
        }
        trennung
    }
}

impl Drop for Lebenszyklus {
    fn drop(&mut self) {
        self.trennen();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
