//! sprechstunde-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use sprechstunde_observability::{
    observability_server_starten, HealthState, RelayStand, SprechstundeMetrics,
};
use sprechstunde_signaling::{SignalingRelay, SignalingServer, SignalingState};
use std::time::Duration;
use tokio::sync::watch;

/// Intervall in dem die Relay-Zaehler in die Metriken uebernommen werden
const METRIK_INTERVALL: Duration = Duration::from_secs(5);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Signaling-Zustand (Relay) aufbauen
    /// 2. WebSocket-Listener starten
    /// 3. Observability-Server und Metrik-Task starten (falls aktiviert)
    /// 4. Auf Ctrl-C warten, dann alle Verbindungen schliessen
    pub async fn starten(self) -> Result<()> {
        let ws_addr = self.config.ws_bind_adresse()?;
        let state = SignalingState::neu(self.config.signaling_config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            server_name = %state.config.server_name,
            ws = %ws_addr,
            pfad = %state.config.ws_pfad,
            max_clients = state.config.max_clients,
            "Server startet"
        );

        let signaling = SignalingServer::neu(state.clone(), ws_addr);
        let signaling_task = tokio::spawn(signaling.starten(shutdown_rx.clone()));

        if self.config.observability.aktiviert {
            let obs_addr = self.config.observability_bind_adresse()?;
            let metriken = SprechstundeMetrics::neu()?;
            let health = HealthState::neu(self.config.server.max_clients as u64);

            tokio::spawn(metriken_aktualisieren(
                state.relay.clone(),
                metriken.clone(),
                health.clone(),
                shutdown_rx.clone(),
            ));

            let obs_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    observability_server_starten(obs_addr, metriken, health, obs_shutdown).await
                {
                    tracing::error!(fehler = %e, "Observability-Server fehlgeschlagen");
                }
            });
        }

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::select! {
            ergebnis = tokio::signal::ctrl_c() => {
                ergebnis?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            // Listener ist vorzeitig beendet (z.B. Port belegt)
            ergebnis = signaling_task => {
                ergebnis??;
                return Ok(());
            }
        }

        let _ = shutdown_tx.send(true);
        // Verbindungen schliessen ihre Sockets selbst; kurz Zeit dafuer lassen
        tokio::time::sleep(Duration::from_millis(200)).await;
        tracing::info!(
            verbindungen = state.relay.verbindungs_anzahl(),
            uptime_sek = state.uptime_sek(),
            "Server beendet"
        );
        Ok(())
    }
}

/// Uebernimmt periodisch die Relay-Zaehler in Prometheus und Health-Check
async fn metriken_aktualisieren(
    relay: SignalingRelay,
    metriken: SprechstundeMetrics,
    health: HealthState,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut intervall = tokio::time::interval(METRIK_INTERVALL);
    loop {
        tokio::select! {
            _ = intervall.tick() => {
                let statistik = relay.statistik();
                metriken.relay_stand_uebernehmen(RelayStand {
                    verbindungen: statistik.verbindungen as u64,
                    raeume: statistik.raeume as u64,
                    zugestellt: statistik.zugestellt,
                    verworfen: statistik.verworfen,
                    ungueltig: statistik.ungueltig,
                });
                health.clients_setzen(statistik.verbindungen as u64);
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
