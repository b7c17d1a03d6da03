//! # ticketgraph HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /graph` - Full graph copy (nodes, edges, metadata)
//! - `GET /graph/metadata` - Graph counters
//! - `POST /learn` - Learn one resolved ticket
//! - `GET /insights` - Ranked insights
//! - `GET /visualization?layout=<name>` - Laid-out graph
//! - `POST /snapshot` - Persist the graph to the snapshot store
//!
//! Authentication, rate limiting and tenant resolution are handled by the
//! gateway in front of this process.

mod handlers;
mod types;

pub use handlers::{
    graph_handler, health_handler, insights_handler, learn_handler, metadata_handler,
    snapshot_handler, visualization_handler,
};
pub use types::{
    ApiError, ErrorResponse, HealthResponse, InsightsResponse, LearnResponse, SnapshotResponse,
    VisualizationQuery,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use ticketgraph_core::{EngineError, KnowledgeEngine, SnapshotStore};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Snapshot store shared between handlers and the shutdown hook.
pub type SharedStore = Arc<dyn SnapshotStore + Send + Sync>;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: one engine per process, optionally backed by a store.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<KnowledgeEngine>,
    pub store: Option<SharedStore>,
    pub snapshot_key: String,
}

impl AppState {
    /// State without a snapshot store.
    #[must_use]
    pub fn new(engine: Arc<KnowledgeEngine>) -> Self {
        Self {
            engine,
            store: None,
            snapshot_key: "default".to_string(),
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: SharedStore, key: impl Into<String>) -> Self {
        self.store = Some(store);
        self.snapshot_key = key.into();
        self
    }

    /// Save the graph to the store, if one is configured.
    pub fn persist(&self) -> Result<Option<usize>, EngineError> {
        match &self.store {
            Some(store) => self
                .engine
                .save_snapshot(store.as_ref(), &self.snapshot_key)
                .map(Some),
            None => Ok(None),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `["*"]`: any origin
/// - empty: localhost only
/// - otherwise: the listed origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: allowing ALL origins; do not use this in production");
        return CorsLayer::permissive();
    }
    if origins.is_empty() {
        tracing::info!("CORS: no origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => {
                tracing::info!("CORS: allowing origin: {}", origin);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("CORS: invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        tracing::warn!("CORS: no valid origins configured, defaulting to localhost only");
        build_localhost_cors()
    } else {
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit.
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/graph", get(handlers::graph_handler))
        .route("/graph/metadata", get(handlers::metadata_handler))
        .route("/learn", post(handlers::learn_handler))
        .route("/insights", get(handlers::insights_handler))
        .route("/visualization", get(handlers::visualization_handler))
        .route("/snapshot", post(handlers::snapshot_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(&server.cors_origins))
                .layer(DefaultBodyLimit::max(server.body_limit_bytes)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl-C or SIGTERM, then save a final snapshot.
pub async fn run_server(state: AppState, server: &ServerConfig) -> Result<(), EngineError> {
    let addr = server.addr();
    let router = create_router(state.clone(), server);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::Io(format!("bind failed: {}", e)))?;

    tracing::info!("ticketgraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| EngineError::Io(format!("server error: {}", e)))?;

    tracing::info!("server stopped, saving snapshot");
    let shutdown_state = state.clone();
    let saved = tokio::task::spawn_blocking(move || shutdown_state.persist())
        .await
        .map_err(|e| EngineError::Io(format!("snapshot task failed: {}", e)))??;
    match saved {
        Some(size) => tracing::info!(key = %state.snapshot_key, size, "final snapshot saved"),
        None => tracing::warn!("no snapshot store configured; graph discarded"),
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
