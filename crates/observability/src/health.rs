//! Health-Check-Endpunkt fuer Sprechstunde
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und verbundenen Clients

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Verbindungslimit erreicht, neue Upgrades werden abgelehnt
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_clients: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub connected_clients: Arc<AtomicU64>,
    /// Verbindungslimit (0 = unbegrenzt)
    pub max_clients: u64,
}

impl HealthState {
    pub fn neu(max_clients: u64) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            connected_clients: Arc::new(AtomicU64::new(0)),
            max_clients,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn clients(&self) -> u64 {
        self.connected_clients.load(Ordering::Relaxed)
    }

    pub fn clients_setzen(&self, anzahl: u64) {
        self.connected_clients.store(anzahl, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        if self.max_clients > 0 && self.clients() >= self.max_clients {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
///
/// Auch `degraded` antwortet mit 200, die Probe soll nicht fehlschlagen.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: state.status(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        connected_clients: state.clients(),
    };

    (StatusCode::OK, Json(response))
}
