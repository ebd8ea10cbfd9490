//! # sprechstunde-observability
//!
//! Observability-Crate fuer Sprechstunde:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, RelayStand, SprechstundeMetrics};
pub use middleware::{request_timing_layer, timing_middleware};

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tokio::sync::watch;

/// Baut den Router fuer Metriken und Health-Check
pub fn observability_router(metriken: SprechstundeMetrics, health: HealthState) -> Router {
    Router::new()
        .merge(metrics_router(metriken.clone()))
        .merge(health_router(health))
        .layer(axum::middleware::from_fn_with_state(
            metriken,
            timing_middleware,
        ))
        .layer(request_timing_layer())
}

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: SprechstundeMetrics,
    health: HealthState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let app = observability_router(metriken, health);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}
