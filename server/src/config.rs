//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use sprechstunde_core::SprechstundeError;
use sprechstunde_observability::logging::{log_format_gueltig, log_level_gueltig};
use sprechstunde_signaling::SignalingConfig;
use std::net::SocketAddr;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Signaling-Verhalten
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen (0 = unbegrenzt)
    pub max_clients: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Sprechstunde Signaling".into(),
            max_clients: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer WebSocket und Observability
    pub bind_adresse: String,
    /// Port fuer das WebSocket-Signaling
    pub ws_port: u16,
    /// HTTP-Pfad fuer das WebSocket-Upgrade
    pub ws_pfad: String,
    /// CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 8000,
            ws_pfad: "/signaling".into(),
            cors_origins: vec![],
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Intervall fuer WebSocket-Pings in Sekunden
    pub keepalive_sek: u64,
    /// Verbindungen ohne eingehenden Frame werden danach getrennt
    pub verbindungs_timeout_sek: u64,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Nachrichtenlimit pro Verbindung (0 = unbegrenzt)
    pub nachrichten_pro_minute: u32,
    /// `user:left` an verbleibende Raummitglieder senden
    pub verlassen_melden: bool,
    /// `session:replaced` an ersetzte Verbindungen senden
    pub ersetzung_melden: bool,
    /// Negative Bestaetigungen (`error`) an den Absender senden
    pub fehler_melden: bool,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
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

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive, z.B. "info" oder "sprechstunde_signaling=debug"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte die serde allein nicht abfangen kann
    pub fn validieren(&self) -> sprechstunde_core::Result<()> {
        if !self.netzwerk.ws_pfad.starts_with('/') {
            return Err(SprechstundeError::konfiguration(format!(
                "netzwerk.ws_pfad muss mit '/' beginnen: '{}'",
                self.netzwerk.ws_pfad
            )));
        }
        if self.signaling.keepalive_sek == 0 {
            return Err(SprechstundeError::konfiguration(
                "signaling.keepalive_sek muss groesser als 0 sein",
            ));
        }
        if self.signaling.verbindungs_timeout_sek <= self.signaling.keepalive_sek {
            return Err(SprechstundeError::konfiguration(
                "signaling.verbindungs_timeout_sek muss groesser als keepalive_sek sein",
            ));
        }
        if self.signaling.send_queue_groesse == 0 {
            return Err(SprechstundeError::konfiguration(
                "signaling.send_queue_groesse muss groesser als 0 sein",
            ));
        }
        let ungueltig = self.signaling_config().ungueltige_origins().join(", ");
        if !ungueltig.is_empty() {
            return Err(SprechstundeError::konfiguration(format!(
                "netzwerk.cors_origins enthaelt ungueltige Eintraege: {ungueltig}"
            )));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(SprechstundeError::konfiguration(format!(
                "logging.level ist keine gueltige Filter-Direktive: '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(SprechstundeError::konfiguration(format!(
                "logging.format muss 'text' oder 'json' sein: '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer das WebSocket-Signaling zurueck
    pub fn ws_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Leitet die Konfiguration des Signaling-Service ab
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            ws_pfad: self.netzwerk.ws_pfad.clone(),
            cors_origins: self.netzwerk.cors_origins.clone(),
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            send_queue_groesse: self.signaling.send_queue_groesse,
            nachrichten_pro_minute: self.signaling.nachrichten_pro_minute,
            verlassen_melden: self.signaling.verlassen_melden,
            ersetzung_melden: self.signaling.ersetzung_melden,
            fehler_melden: self.signaling.fehler_melden,
        }
    }
}

fn bind_adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse '{host}:{port}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 1024);
        assert_eq!(cfg.netzwerk.ws_pfad, "/signaling");
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.signaling.verlassen_melden);
        assert!(!cfg.signaling.ersetzung_melden);
        assert!(!cfg.signaling.fehler_melden);
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(
            cfg.ws_bind_adresse().unwrap(),
            "0.0.0.0:8000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cfg.observability_bind_adresse().unwrap().port(), 9300);
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein-host".into();
        assert!(cfg.ws_bind_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Praxis Dr. Huber"
            max_clients = 100

            [netzwerk]
            ws_port = 9000

            [signaling]
            verlassen_melden = true
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Praxis Dr. Huber");
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.netzwerk.ws_port, 9000);
        assert!(cfg.signaling.verlassen_melden);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.ws_pfad, "/signaling");
        assert_eq!(cfg.signaling.keepalive_sek, 30);
    }

    #[test]
    fn validierung_lehnt_unsinnige_werte_ab() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.ws_pfad = "signaling".into();
        assert!(matches!(
            cfg.validieren(),
            Err(SprechstundeError::Konfiguration(_))
        ));

        let mut cfg = ServerConfig::default();
        cfg.signaling.verbindungs_timeout_sek = cfg.signaling.keepalive_sek;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn log_level_mit_direktiven() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "info,sprechstunde_signaling=debug".into();
        assert!(cfg.validieren().is_ok());

        cfg.logging.level = "sprechstunde_signaling=gespraechig".into();
        assert!(matches!(
            cfg.validieren(),
            Err(SprechstundeError::Konfiguration(_))
        ));
    }

    #[test]
    fn ungueltige_cors_origins_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.cors_origins = vec!["https://praxis.example".into()];
        assert!(cfg.validieren().is_ok());

        cfg.netzwerk.cors_origins.push("https://tippfehler\u{7f}.example".into());
        let fehler = cfg.validieren().unwrap_err().to_string();
        assert!(fehler.contains("cors_origins"), "{fehler}");
        assert!(!fehler.contains("praxis.example"), "{fehler}");
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/config.toml").unwrap();
        assert_eq!(cfg.netzwerk.ws_port, 8000);
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.signaling.fehler_melden = true;
        cfg.netzwerk.cors_origins = vec!["https://praxis.example".into()];

        let sc = cfg.signaling_config();
        assert!(sc.fehler_melden);
        assert_eq!(sc.max_clients, 1024);
        assert_eq!(sc.cors_origins, vec!["https://praxis.example".to_string()]);
    }
}
