//! HTTP ingress and dashboard streaming
//!
//! Thin glue between agents and the registry: every accepted request becomes a
//! [`Report`](crate::actors::messages::Report) on the registry's ingress queue.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (never authenticated)
//! - `POST /probe/{machine}/report` - Push a service report
//! - `DELETE /probe/{machine}` - Stop monitoring a machine
//! - `GET /probes` - Current status of every probe
//! - `WS /dashws` - Dashboard snapshot stream (only when the dashboard is enabled)

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{HealthResponse, ReportPayload};

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:5000")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for the dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: SocketAddr::new(config.address, config.port),
            auth_token: config.auth_token.clone().filter(|token| !token.is_empty()),
            enable_cors: config.dashboard,
        }
    }
}

/// Assemble the router. Everything except `/health` sits behind the auth layer.
pub fn build_router(config: &ApiConfig, state: ApiState) -> Router {
    let mut protected = Router::new()
        .route("/probe/:machine/report", post(routes::probes::post_report))
        .route("/probe/:machine", delete(routes::probes::delete_probe))
        .route("/probes", get(routes::probes::list_probes));

    if state.dashboard_tx.is_some() {
        protected = protected.route("/dashws", get(websocket::dashboard_handler));
    }

    if let Some(token) = &config.auth_token {
        protected = protected.route_layer(axum::middleware::from_fn_with_state(
            token.clone(),
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
