//! WebSocket-Listener – HTTP-Upgrade auf den Signaling-Pfad
//!
//! Der `SignalingServer` bindet einen TCP-Socket und bedient ihn mit axum.
//! Jedes erfolgreiche Upgrade auf `ws_pfad` startet eine `ClientConnection`
//! in einem eigenen tokio-Task.
//!
//! ## Verbindungslimit
//! Sind `max_clients` Verbindungen aktiv, wird das Upgrade mit
//! `503 Service Unavailable` abgelehnt.

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::ClientConnection;
use crate::error::SignalingResult;
use crate::server_state::SignalingState;

/// Router-Zustand fuer den Upgrade-Handler
#[derive(Clone)]
struct WsState {
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Bindet den Socket und bedient ihn bis zum Shutdown-Signal
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> SignalingResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        Self::mit_listener(self.state, listener, shutdown_rx).await
    }

    /// Bedient einen bereits gebundenen Listener (z.B. Port 0 in Tests)
    pub async fn mit_listener(
        state: Arc<SignalingState>,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let lokale_addr = listener.local_addr()?;
        let app = router(Arc::clone(&state), shutdown_rx.clone());

        tracing::info!(
            adresse = %lokale_addr,
            pfad = %state.config.ws_pfad,
            "WebSocket Signaling-Server gestartet"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
        })
        .await?;

        tracing::info!("WebSocket Signaling-Server gestoppt");
        Ok(())
    }
}

/// Baut den Router mit Upgrade-Route, CORS und HTTP-Tracing
pub fn router(state: Arc<SignalingState>, shutdown_rx: watch::Receiver<bool>) -> Router {
    // CORS: entweder spezifische Origins oder Any
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(wert) => Some(wert),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ungueltiger CORS-Origin ignoriert");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    };

    let pfad = state.config.ws_pfad.clone();
    Router::new()
        .route(&pfad, get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(WsState { state, shutdown_rx })
}

/// GET <ws_pfad> – WebSocket-Upgrade
async fn ws_upgrade(
    State(ws): State<WsState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    upgrade: WebSocketUpgrade,
) -> Response {
    if ws.state.relay.ist_voll() {
        tracing::warn!(
            peer = %peer_addr,
            max = ws.state.config.max_clients,
            "Server voll – Upgrade abgelehnt"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Server ist voll").into_response();
    }

    let verbindung = ClientConnection::neu(Arc::clone(&ws.state), Some(peer_addr));
    let shutdown_rx = ws.shutdown_rx.clone();
    upgrade.on_upgrade(move |socket| verbindung.verarbeiten(socket, shutdown_rx))
}
