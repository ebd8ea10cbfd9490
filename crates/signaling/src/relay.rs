//! Signaling-Relay – Gemeinsamer Relay-Zustand hinter einem Lock
//!
//! Registry, Raum-Mitgliedschaften und Send-Queues gehoeren einem einzigen
//! Zustandsobjekt. Jede Operation haelt den Lock fuer ihre gesamte Dauer,
//! dadurch ist jedes Binden, Beitreten und Trennen atomar gegenueber jedem
//! Broadcast und jeder Nachschlage-Operation.
//!
//! Der Lock wird nie ueber einen `.await` gehalten: Senden bedeutet nur
//! nicht-blockierendes Einreihen in die Queue des Empfaengers.

use parking_lot::Mutex;
use sprechstunde_core::{ClientIdentity, ConnectionId, RoomKey};
use sprechstunde_protocol::{RoomJoinPayload, ServerEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::EventBroadcaster;
use crate::error::{SignalingError, SignalingResult};
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembership;

// ---------------------------------------------------------------------------
// Optionen und Ergebnisse
// ---------------------------------------------------------------------------

/// Verhalten des Relays
#[derive(Debug, Clone)]
pub struct RelayOptionen {
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale gleichzeitige Verbindungen (0 = unbegrenzt)
    pub max_clients: usize,
    /// `user:left` an verbleibende Raummitglieder senden
    pub verlassen_melden: bool,
    /// `session:replaced` an die ersetzte Verbindung senden
    pub ersetzung_melden: bool,
}

impl Default for RelayOptionen {
    fn default() -> Self {
        Self {
            send_queue_groesse: 64,
            max_clients: 1024,
            verlassen_melden: false,
            ersetzung_melden: false,
        }
    }
}

/// Ergebnis eines Raum-Beitritts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beitritt {
    /// Verbindung die vorher unter derselben Identitaet gebunden war
    pub ersetzt: Option<ConnectionId>,
    /// Anzahl der Mitglieder die `user:joined` erhalten haben
    pub benachrichtigt: usize,
    /// `false` wenn das Handle bereits Mitglied war
    pub neu_im_raum: bool,
}

/// Ergebnis einer Trennung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trennung {
    /// Identitaet die zum Zeitpunkt der Trennung an das Handle gebunden war
    pub identitaet: Option<ClientIdentity>,
    /// Raeume aus denen das Handle entfernt wurde
    pub raeume: Vec<RoomKey>,
}

/// Momentaufnahme der Relay-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatistik {
    pub verbindungen: usize,
    pub identitaeten: usize,
    pub raeume: usize,
    pub zugestellt: u64,
    pub verworfen: u64,
    pub ungueltig: u64,
}

// ---------------------------------------------------------------------------
// SignalingRelay
// ---------------------------------------------------------------------------

/// Alle Tabellen des Relays; nur ueber den Relay-Lock erreichbar
#[derive(Debug)]
struct RelayZustand {
    registry: ConnectionRegistry,
    raeume: RoomMembership,
    broadcaster: EventBroadcaster,
}

/// Der Signaling-Relay
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SignalingRelay {
    inner: Arc<SignalingRelayInner>,
}

struct SignalingRelayInner {
    zustand: Mutex<RelayZustand>,
    optionen: RelayOptionen,
    /// Verworfene, nicht dekodierbare Nachrichten
    ungueltig: AtomicU64,
}

impl SignalingRelay {
    /// Erstellt einen neuen, leeren Relay
    pub fn neu(optionen: RelayOptionen) -> Self {
        let zustand = RelayZustand {
            registry: ConnectionRegistry::neu(),
            raeume: RoomMembership::neu(),
            broadcaster: EventBroadcaster::neu(optionen.send_queue_groesse),
        };
        Self {
            inner: Arc::new(SignalingRelayInner {
                zustand: Mutex::new(zustand),
                optionen,
                ungueltig: AtomicU64::new(0),
            }),
        }
    }

    pub fn optionen(&self) -> &RelayOptionen {
        &self.inner.optionen
    }

    /// Registriert eine neue Verbindung und gibt ihre Send-Queue zurueck
    ///
    /// Keine Protokoll-Nebenwirkung bis zum ersten `room:join`.
    pub fn verbinden(&self, verbindung: ConnectionId) -> SignalingResult<mpsc::Receiver<ServerEvent>> {
        let mut zustand = self.inner.zustand.lock();
        let max = self.inner.optionen.max_clients;
        if max > 0 && zustand.broadcaster.client_anzahl() >= max {
            return Err(SignalingError::ServerVoll(max));
        }
        Ok(zustand.broadcaster.client_registrieren(verbindung))
    }

    /// Prueft ob das Limit gleichzeitiger Verbindungen erreicht ist
    pub fn ist_voll(&self) -> bool {
        let max = self.inner.optionen.max_clients;
        max > 0 && self.verbindungs_anzahl() >= max
    }

    /// `room:join`: Binden, Beitreten, `user:joined` an die anderen
    /// Mitglieder und Bestaetigung an den Absender
    ///
    /// Ist die Send-Queue des Handles bereits entfernt (Trennung lief
    /// vorher), passiert nichts und `NichtVerbunden` wird zurueckgegeben.
    pub fn raum_beitreten(
        &self,
        verbindung: ConnectionId,
        identitaet: ClientIdentity,
        raum: RoomKey,
    ) -> SignalingResult<Beitritt> {
        let mut guard = self.inner.zustand.lock();
        let zustand = &mut *guard;

        if !zustand.broadcaster.ist_registriert(&verbindung) {
            return Err(SignalingError::NichtVerbunden);
        }

        let ersetzt = zustand.registry.binden(identitaet.clone(), verbindung);
        let neu_im_raum = zustand.raeume.beitreten(&raum, verbindung);

        let beigetreten = ServerEvent::UserJoined {
            identity: identitaet.clone(),
            id: verbindung,
        };
        let benachrichtigt =
            zustand
                .raeume
                .broadcast_ausser(&raum, &verbindung, &beigetreten, &zustand.broadcaster);

        zustand.broadcaster.an_client_senden(
            &verbindung,
            ServerEvent::RoomJoined(RoomJoinPayload {
                identity: identitaet.clone(),
                room: raum.clone(),
            }),
        );

        if let Some(alt) = ersetzt {
            if self.inner.optionen.ersetzung_melden {
                zustand.broadcaster.an_client_senden(
                    &alt,
                    ServerEvent::SessionReplaced {
                        identity: identitaet.clone(),
                        id: verbindung,
                    },
                );
            }
        }

        tracing::info!(
            verbindung = %verbindung,
            identitaet = %identitaet,
            raum = %raum,
            benachrichtigt,
            "Raum beigetreten"
        );

        Ok(Beitritt {
            ersetzt,
            benachrichtigt,
            neu_im_raum,
        })
    }

    /// Reiht `nachricht` in die Queue von `an` ein
    ///
    /// Unbekannte oder getrennte Ziele sind kein Fehler; die Nachricht wird
    /// verworfen und `false` zurueckgegeben.
    pub fn weiterleiten(&self, an: &ConnectionId, nachricht: ServerEvent) -> bool {
        let zustand = self.inner.zustand.lock();
        zustand.broadcaster.an_client_senden(an, nachricht)
    }

    /// Raeumt alle Eintraege eines Handles ab
    ///
    /// Entbinden, aus allen Raeumen entfernen und Send-Queue schliessen
    /// passieren unter einem Lock. Gibt `None` zurueck wenn das Handle
    /// unbekannt war (doppeltes Trennen).
    pub fn trennen(&self, verbindung: &ConnectionId) -> Option<Trennung> {
        let mut guard = self.inner.zustand.lock();
        let zustand = &mut *guard;

        let war_verbunden = zustand.broadcaster.client_entfernen(verbindung);
        let identitaet = zustand.registry.entbinden(verbindung);
        let raeume = zustand.raeume.aus_allen_entfernen(verbindung);

        if !war_verbunden && identitaet.is_none() && raeume.is_empty() {
            return None;
        }

        if self.inner.optionen.verlassen_melden {
            let verlassen = ServerEvent::UserLeft {
                identity: identitaet.clone(),
                id: *verbindung,
            };
            for raum in &raeume {
                zustand
                    .raeume
                    .broadcast_ausser(raum, verbindung, &verlassen, &zustand.broadcaster);
            }
        }

        debug_assert!(zustand.registry.identitaet_von(verbindung).is_none());
        Some(Trennung { identitaet, raeume })
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn identitaet_von(&self, verbindung: &ConnectionId) -> Option<ClientIdentity> {
        self.inner
            .zustand
            .lock()
            .registry
            .identitaet_von(verbindung)
            .cloned()
    }

    pub fn verbindung_von(&self, identitaet: &ClientIdentity) -> Option<ConnectionId> {
        self.inner.zustand.lock().registry.verbindung_von(identitaet)
    }

    /// Mitglieder eines Raums (leer bei unbekanntem Raum)
    pub fn mitglieder(&self, raum: &RoomKey) -> Vec<ConnectionId> {
        self.inner.zustand.lock().raeume.mitglieder(raum)
    }

    pub fn raeume_von(&self, verbindung: &ConnectionId) -> Vec<RoomKey> {
        self.inner.zustand.lock().raeume.raeume_von(verbindung)
    }

    /// Anzahl lebender Verbindungen
    pub fn verbindungs_anzahl(&self) -> usize {
        self.inner.zustand.lock().broadcaster.client_anzahl()
    }

    /// Zaehlt eine verworfene, nicht dekodierbare Nachricht
    pub fn ungueltig_zaehlen(&self) {
        self.inner.ungueltig.fetch_add(1, Ordering::Relaxed);
    }

    pub fn statistik(&self) -> RelayStatistik {
        let zustand = self.inner.zustand.lock();
        RelayStatistik {
            verbindungen: zustand.broadcaster.client_anzahl(),
            identitaeten: zustand.registry.anzahl(),
            raeume: zustand.raeume.raum_anzahl(),
            zugestellt: zustand.broadcaster.zugestellt_anzahl(),
            verworfen: zustand.broadcaster.verworfen_anzahl(),
            ungueltig: self.inner.ungueltig.load(Ordering::Relaxed),
        }
    }

    /// Prueft dass kein Handle ohne Send-Queue in Registry oder Raeumen steht
    pub fn ist_konsistent(&self) -> bool {
        let zustand = self.inner.zustand.lock();
        zustand.registry.ist_konsistent()
            && zustand
                .registry
                .gebundene_verbindungen()
                .chain(zustand.raeume.verbindungen())
                .all(|v| zustand.broadcaster.ist_registriert(v))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> ClientIdentity {
        ClientIdentity::neu(s).unwrap()
    }

    fn raum(s: &str) -> RoomKey {
        RoomKey::neu(s).unwrap()
    }

    fn relay() -> SignalingRelay {
        SignalingRelay::neu(RelayOptionen::default())
    }

    #[tokio::test]
    async fn beitritt_benachrichtigt_andere_und_bestaetigt_absender() {
        let relay = relay();
        let (h1, h2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = relay.verbinden(h1).unwrap();
        let mut rx2 = relay.verbinden(h2).unwrap();

        relay.raum_beitreten(h1, id("a@x.com"), raum("r1")).unwrap();
        assert!(matches!(rx1.try_recv().unwrap(), ServerEvent::RoomJoined(_)));

        let beitritt = relay.raum_beitreten(h2, id("b@x.com"), raum("r1")).unwrap();
        assert_eq!(beitritt.benachrichtigt, 1);
        assert!(beitritt.neu_im_raum);

        assert_eq!(
            rx1.try_recv().unwrap(),
            ServerEvent::UserJoined {
                identity: id("b@x.com"),
                id: h2
            }
        );
        assert_eq!(
            rx2.try_recv().unwrap(),
            ServerEvent::RoomJoined(RoomJoinPayload {
                identity: id("b@x.com"),
                room: raum("r1"),
            })
        );
        // Der Absender erhaelt kein eigenes user:joined
        assert!(rx2.try_recv().is_err());
        assert!(relay.ist_konsistent());
    }

    #[tokio::test]
    async fn neu_binden_ist_standardmaessig_still() {
        let relay = relay();
        let (h1, h2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = relay.verbinden(h1).unwrap();
        let _rx2 = relay.verbinden(h2).unwrap();

        relay.raum_beitreten(h1, id("a@x.com"), raum("r1")).unwrap();
        let _ = rx1.try_recv();

        let beitritt = relay.raum_beitreten(h2, id("a@x.com"), raum("r2")).unwrap();
        assert_eq!(beitritt.ersetzt, Some(h1));
        assert_eq!(relay.verbindung_von(&id("a@x.com")), Some(h2));
        assert_eq!(relay.identitaet_von(&h1), None);
        // Alte Verbindung bleibt offen und erhaelt nichts
        assert!(rx1.try_recv().is_err());
        assert_eq!(relay.verbindungs_anzahl(), 2);
    }

    #[tokio::test]
    async fn ersetzung_melden_benachrichtigt_alte_verbindung() {
        let relay = SignalingRelay::neu(RelayOptionen {
            ersetzung_melden: true,
            ..RelayOptionen::default()
        });
        let (h1, h2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = relay.verbinden(h1).unwrap();
        let _rx2 = relay.verbinden(h2).unwrap();

        relay.raum_beitreten(h1, id("a@x.com"), raum("r1")).unwrap();
        let _ = rx1.try_recv();
        relay.raum_beitreten(h2, id("a@x.com"), raum("r1")).unwrap();

        // Zuerst user:joined (h1 ist noch Mitglied von r1), dann die Ersetzung
        assert!(matches!(rx1.try_recv().unwrap(), ServerEvent::UserJoined { .. }));
        assert_eq!(
            rx1.try_recv().unwrap(),
            ServerEvent::SessionReplaced {
                identity: id("a@x.com"),
                id: h2
            }
        );
    }

    #[tokio::test]
    async fn gezielte_weiterleitung_erreicht_nur_das_ziel() {
        let relay = relay();
        let (h1, h2, h3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        let mut rx1 = relay.verbinden(h1).unwrap();
        let mut rx2 = relay.verbinden(h2).unwrap();
        let mut rx3 = relay.verbinden(h3).unwrap();

        let nachricht = ServerEvent::IncomingCall {
            from: h1,
            offer: json!({"sdp": "o"}),
        };
        assert!(relay.weiterleiten(&h2, nachricht.clone()));

        assert_eq!(rx2.try_recv().unwrap(), nachricht);
        assert!(rx1.try_recv().is_err());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn weiterleiten_an_unbekanntes_ziel_wird_verworfen() {
        let relay = relay();
        let nachricht = ServerEvent::IncomingCall {
            from: ConnectionId::new(),
            offer: json!(null),
        };
        assert!(!relay.weiterleiten(&ConnectionId::new(), nachricht));
        assert_eq!(relay.statistik().verworfen, 1);
    }

    #[tokio::test]
    async fn trennen_raeumt_alles_ab() {
        let relay = relay();
        let (h1, h2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = relay.verbinden(h1).unwrap();
        let _rx2 = relay.verbinden(h2).unwrap();

        relay.raum_beitreten(h1, id("a@x.com"), raum("r1")).unwrap();
        relay.raum_beitreten(h1, id("a@x.com"), raum("r2")).unwrap();
        relay.raum_beitreten(h2, id("b@x.com"), raum("r1")).unwrap();

        let mut trennung = relay.trennen(&h1).unwrap();
        trennung.raeume.sort();
        assert_eq!(trennung.identitaet, Some(id("a@x.com")));
        assert_eq!(trennung.raeume, vec![raum("r1"), raum("r2")]);

        assert_eq!(relay.identitaet_von(&h1), None);
        assert_eq!(relay.verbindung_von(&id("a@x.com")), None);
        assert_eq!(relay.mitglieder(&raum("r1")), vec![h2]);
        assert!(relay.mitglieder(&raum("r2")).is_empty());
        assert!(relay.raeume_von(&h1).is_empty());
        assert_eq!(relay.verbindungs_anzahl(), 1);
        assert!(relay.ist_konsistent());

        // Queue ist geschlossen, nach den bereits eingereihten Nachrichten
        while rx1.try_recv().is_ok() {}
        assert!(rx1.recv().await.is_none());

        // Doppeltes Trennen ist ein No-op
        assert_eq!(relay.trennen(&h1), None);
    }

    #[tokio::test]
    async fn trennen_ohne_verlassen_melden_ist_still() {
        let relay = relay();
        let (h1, h2) = (ConnectionId::new(), ConnectionId::new());
        let _rx1 = relay.verbinden(h1).unwrap();
        let mut rx2 = relay.verbinden(h2).unwrap();
        relay.raum_beitreten(h2, id("b@x.com"), raum("r1")).unwrap();
        relay.raum_beitreten(h1, id("a@x.com"), raum("r1")).unwrap();
        while rx2.try_recv().is_ok() {}

        relay.trennen(&h1);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn verlassen_melden_sendet_user_left() {
        let relay = SignalingRelay::neu(RelayOptionen {
            verlassen_melden: true,
            ..RelayOptionen::default()
        });
        let (h1, h2) = (ConnectionId::new(), ConnectionId::new());
        let _rx1 = relay.verbinden(h1).unwrap();
        let mut rx2 = relay.verbinden(h2).unwrap();
        relay.raum_beitreten(h2, id("b@x.com"), raum("r1")).unwrap();
        relay.raum_beitreten(h1, id("a@x.com"), raum("r1")).unwrap();
        while rx2.try_recv().is_ok() {}

        relay.trennen(&h1);
        assert_eq!(
            rx2.try_recv().unwrap(),
            ServerEvent::UserLeft {
                identity: Some(id("a@x.com")),
                id: h1
            }
        );
    }

    #[test]
    fn beitritt_nach_trennung_ist_noop() {
        let relay = relay();
        let h1 = ConnectionId::new();
        let _rx1 = relay.verbinden(h1).unwrap();
        relay.trennen(&h1);

        let ergebnis = relay.raum_beitreten(h1, id("a@x.com"), raum("r1"));
        assert!(matches!(ergebnis, Err(SignalingError::NichtVerbunden)));
        assert_eq!(relay.verbindung_von(&id("a@x.com")), None);
        assert!(relay.mitglieder(&raum("r1")).is_empty());
        assert!(relay.ist_konsistent());
    }

    #[test]
    fn verbindungslimit() {
        let relay = SignalingRelay::neu(RelayOptionen {
            max_clients: 2,
            ..RelayOptionen::default()
        });
        let _rx1 = relay.verbinden(ConnectionId::new()).unwrap();
        let h2 = ConnectionId::new();
        let _rx2 = relay.verbinden(h2).unwrap();
        assert!(relay.ist_voll());
        assert!(matches!(
            relay.verbinden(ConnectionId::new()),
            Err(SignalingError::ServerVoll(2))
        ));

        relay.trennen(&h2);
        assert!(!relay.ist_voll());
        assert!(relay.verbinden(ConnectionId::new()).is_ok());
    }

    #[tokio::test]
    async fn nebenlaeufiges_beitreten_und_trennen_bleibt_konsistent() {
        let relay = relay();
        let mut tasks = Vec::new();

        for n in 0..32 {
            let relay = relay.clone();
            tasks.push(tokio::spawn(async move {
                let h = ConnectionId::new();
                let _rx = relay.verbinden(h).unwrap();
                let ident = id(&format!("user{}@x.com", n % 8));
                let _ = relay.raum_beitreten(h, ident, raum(&format!("r{}", n % 3)));
                tokio::task::yield_now().await;
                relay.trennen(&h);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert!(relay.ist_konsistent());
        let statistik = relay.statistik();
        assert_eq!(statistik.verbindungen, 0);
        assert_eq!(statistik.identitaeten, 0);
        assert_eq!(statistik.raeume, 0);
    }
}
