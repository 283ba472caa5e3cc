//! HTTP and WebSocket adapter for the monitoring core
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Monitor** shared through [`ApiState`] for storage queries and hub access
//! - **WebSocket** sockets registered as hub subscribers
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/services/:id/beats` - Historical beats of a service
//! - `WS /ws/services` - Status board, global channel
//! - `WS /ws/services/:channel` - Status board, given channel
//! - `WS /ws/servers` - Resource board, global channel
//!
//! A text frame holding an integer moves a status board socket to that channel.

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{BeatsResponse, HealthResponse};

use std::net::{IpAddr, SocketAddr};

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for dashboards served elsewhere
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(crate::util::get_addr()), crate::util::get_port()),
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Config file values, falling back to `HEARTBEAT_ADDR` / `HEARTBEAT_PORT`
    pub fn from_settings(settings: &ApiSettings) -> anyhow::Result<Self> {
        let ip: IpAddr = match &settings.bind {
            Some(bind) => bind.parse()?,
            None => IpAddr::V4(crate::util::get_addr()),
        };
        let port = settings.port.unwrap_or_else(crate::util::get_port);

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            enable_cors: settings.enable_cors,
        })
    }
}

/// Build the router with every route
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/services/:id/beats", get(routes::beats::get_service_beats))
        .route("/ws/services", get(websocket::services_global_handler))
        .route("/ws/services/:channel", get(websocket::services_handler))
        .route("/ws/servers", get(websocket::servers_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
