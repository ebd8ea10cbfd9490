//! Event-Broadcaster – Send-Queues aller verbundenen Clients
//!
//! Jede Verbindung bekommt beim Aufbau eine begrenzte Send-Queue. Der
//! Relay reiht Ereignisse nicht-blockierend ein; die `ClientConnection`
//! liest die Queue und schreibt auf den WebSocket.
//!
//! ## Zustellung
//! - Best-Effort: volle oder geschlossene Queues verwerfen die Nachricht
//!   nur fuer diesen einen Empfaenger
//! - FIFO pro Empfaenger (eine mpsc-Queue pro Verbindung)
//! - Ein langsamer Client blockiert niemals die Zustellung an andere

use sprechstunde_core::ConnectionId;
use sprechstunde_protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub verbindung: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerEvent) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(
                    verbindung = %self.verbindung,
                    event = n.name(),
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.verbindung, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Send-Queues aller verbundenen Clients
///
/// Nicht selbst synchronisiert; lebt im `RelayZustand` hinter dem Relay-Lock.
/// Die Registrierung einer Queue markiert eine Verbindung als lebendig.
#[derive(Debug)]
pub struct EventBroadcaster {
    /// Client-Sender, indiziert nach Handle
    clients: HashMap<ConnectionId, ClientSender>,
    /// Kapazitaet jeder neuen Send-Queue
    queue_groesse: usize,
    /// Anzahl eingereihter Nachrichten
    zugestellt: AtomicU64,
    /// Anzahl verworfener Nachrichten (voll, geschlossen, unbekannt)
    verworfen: AtomicU64,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu(queue_groesse: usize) -> Self {
        Self {
            clients: HashMap::new(),
            queue_groesse: queue_groesse.max(1),
            zugestellt: AtomicU64::new(0),
            verworfen: AtomicU64::new(0),
        }
    }

    /// Registriert einen neuen Client und gibt seine Empfangs-Queue zurueck
    pub fn client_registrieren(&mut self, verbindung: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.queue_groesse);
        self.clients
            .insert(verbindung, ClientSender { verbindung, tx });
        tracing::debug!(verbindung = %verbindung, "Client im Broadcaster registriert");
        rx
    }

    /// Entfernt einen Client; seine Queue wird damit geschlossen
    pub fn client_entfernen(&mut self, verbindung: &ConnectionId) -> bool {
        let entfernt = self.clients.remove(verbindung).is_some();
        if entfernt {
            tracing::debug!(verbindung = %verbindung, "Client aus Broadcaster entfernt");
        }
        entfernt
    }

    /// Sendet eine Nachricht an einen einzelnen Client
    ///
    /// Gibt `true` zurueck wenn der Client gefunden und die Nachricht eingereiht wurde.
    pub fn an_client_senden(&self, verbindung: &ConnectionId, nachricht: ServerEvent) -> bool {
        let zugestellt = match self.clients.get(verbindung) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(verbindung = %verbindung, "Senden an unbekannten Client");
                false
            }
        };
        let zaehler = if zugestellt {
            &self.zugestellt
        } else {
            &self.verworfen
        };
        zaehler.fetch_add(1, Ordering::Relaxed);
        zugestellt
    }

    /// Prueft ob ein Client registriert ist
    pub fn ist_registriert(&self, verbindung: &ConnectionId) -> bool {
        self.clients.contains_key(verbindung)
    }

    /// Gibt die Anzahl der registrierten Clients zurueck
    pub fn client_anzahl(&self) -> usize {
        self.clients.len()
    }

    /// Gesamtzahl eingereihter Nachrichten seit dem Start
    pub fn zugestellt_anzahl(&self) -> u64 {
        self.zugestellt.load(Ordering::Relaxed)
    }

    /// Gesamtzahl verworfener Nachrichten seit dem Start
    pub fn verworfen_anzahl(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
