//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Konfiguration und Relay als Arc-Referenzen, die zwischen den
//! Verbindungs-Tasks geteilt werden.

use axum::http::HeaderValue;
use std::sync::Arc;
use std::time::Instant;

use crate::relay::{RelayOptionen, SignalingRelay};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen (0 = unbegrenzt)
    pub max_clients: usize,
    /// HTTP-Pfad fuer das WebSocket-Upgrade
    pub ws_pfad: String,
    /// Erlaubte CORS-Origins (leer = alle)
    pub cors_origins: Vec<String>,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Nachrichtenlimit pro Verbindung (0 = unbegrenzt)
    pub nachrichten_pro_minute: u32,
    /// `user:left` beim Trennen senden
    pub verlassen_melden: bool,
    /// `session:replaced` an ersetzte Verbindungen senden
    pub ersetzung_melden: bool,
    /// Negative Bestaetigungen an den Absender senden
    pub fehler_melden: bool,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Sprechstunde Signaling".to_string(),
            max_clients: 1024,
            ws_pfad: "/signaling".to_string(),
            cors_origins: Vec::new(),
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: 64,
            nachrichten_pro_minute: 600,
            verlassen_melden: false,
            ersetzung_melden: false,
            fehler_melden: false,
        }
    }
}

impl SignalingConfig {
    /// Leitet die Relay-Optionen aus der Konfiguration ab
    pub fn relay_optionen(&self) -> RelayOptionen {
        RelayOptionen {
            send_queue_groesse: self.send_queue_groesse,
            max_clients: self.max_clients,
            verlassen_melden: self.verlassen_melden,
            ersetzung_melden: self.ersetzung_melden,
        }
    }

    /// CORS-Origins die kein gueltiger Header-Wert sind
    pub fn ungueltige_origins(&self) -> Vec<&str> {
        self.cors_origins
            .iter()
            .filter(|o| HeaderValue::from_str(o).is_err())
            .map(String::as_str)
            .collect()
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Relay (Registry, Raeume, Send-Queues)
    pub relay: SignalingRelay,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig) -> Arc<Self> {
        let relay = SignalingRelay::neu(config.relay_optionen());
        Arc::new(Self {
            config: Arc::new(config),
            relay,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungueltige_origins_werden_gefunden() {
        let config = SignalingConfig {
            cors_origins: vec![
                "https://praxis.example".into(),
                "https://praxis\n.example".into(),
                "http://localhost:5173".into(),
            ],
            ..SignalingConfig::default()
        };
        assert_eq!(config.ungueltige_origins(), vec!["https://praxis\n.example"]);
        assert!(SignalingConfig::default().ungueltige_origins().is_empty());
    }

    #[test]
    fn relay_optionen_uebernehmen_flags() {
        let config = SignalingConfig {
            max_clients: 2,
            verlassen_melden: true,
            ..SignalingConfig::default()
        };
        let optionen = config.relay_optionen();
        assert_eq!(optionen.max_clients, 2);
        assert!(optionen.verlassen_melden);
        assert!(!optionen.ersetzung_melden);
    }
}
