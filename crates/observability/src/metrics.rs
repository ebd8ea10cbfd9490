//! Prometheus-kompatible Metriken fuer Sprechstunde
//!
//! Registrierte Metriken:
//! - `sprechstunde_connected_clients` – Gauge: Aktuell verbundene Clients
//! - `sprechstunde_rooms_active` – Gauge: Nicht-leere Raeume
//! - `sprechstunde_messages_relayed_total` – Counter: Eingereihte Ereignisse
//! - `sprechstunde_messages_dropped_total` – Counter: Verworfene Ereignisse
//! - `sprechstunde_messages_malformed_total` – Counter: Ungueltige Client-Nachrichten
//! - `sprechstunde_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `sprechstunde_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//!
//! Der Relay fuehrt eigene atomare Zaehler. Ein Hintergrund-Task uebernimmt
//! sie periodisch per [`SprechstundeMetrics::relay_stand_uebernehmen`].

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Momentaufnahme der Relay-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStand {
    pub verbindungen: u64,
    pub raeume: u64,
    pub zugestellt: u64,
    pub verworfen: u64,
    pub ungueltig: u64,
}

/// Alle Sprechstunde-Prometheus-Metriken
#[derive(Clone)]
pub struct SprechstundeMetrics {
    pub registry: Arc<Registry>,

    // Relay-Metriken
    pub connected_clients: IntGauge,
    pub rooms_active: IntGauge,
    pub messages_relayed_total: IntCounter,
    pub messages_dropped_total: IntCounter,
    pub messages_malformed_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl SprechstundeMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Relay-Metriken ---
        let connected_clients = IntGauge::with_opts(Opts::new(
            "sprechstunde_connected_clients",
            "Anzahl aktuell verbundener Clients",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let rooms_active = IntGauge::with_opts(Opts::new(
            "sprechstunde_rooms_active",
            "Anzahl nicht-leerer Raeume",
        ))?;
        registry.register(Box::new(rooms_active.clone()))?;

        let messages_relayed_total = IntCounter::with_opts(Opts::new(
            "sprechstunde_messages_relayed_total",
            "Gesamtanzahl eingereihter Signaling-Ereignisse",
        ))?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        let messages_dropped_total = IntCounter::with_opts(Opts::new(
            "sprechstunde_messages_dropped_total",
            "Gesamtanzahl verworfener Signaling-Ereignisse (Ziel unbekannt, Queue voll)",
        ))?;
        registry.register(Box::new(messages_dropped_total.clone()))?;

        let messages_malformed_total = IntCounter::with_opts(Opts::new(
            "sprechstunde_messages_malformed_total",
            "Gesamtanzahl ungueltiger Client-Nachrichten",
        ))?;
        registry.register(Box::new(messages_malformed_total.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "sprechstunde_http_requests_total",
                "Gesamtanzahl HTTP-Anfragen",
            ),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sprechstunde_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            rooms_active,
            messages_relayed_total,
            messages_dropped_total,
            messages_malformed_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Uebernimmt den aktuellen Stand der Relay-Zaehler
    ///
    /// Counter werden nur um die Differenz erhoeht und fallen nie.
    pub fn relay_stand_uebernehmen(&self, stand: RelayStand) {
        self.connected_clients.set(stand.verbindungen as i64);
        self.rooms_active.set(stand.raeume as i64);
        nachziehen(&self.messages_relayed_total, stand.zugestellt);
        nachziehen(&self.messages_dropped_total, stand.verworfen);
        nachziehen(&self.messages_malformed_total, stand.ungueltig);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn nachziehen(counter: &IntCounter, stand: u64) {
    let aktuell = counter.get();
    if stand > aktuell {
        counter.inc_by(stand - aktuell);
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: SprechstundeMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<SprechstundeMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
