//! # API Request/Response Types
//!
//! JSON envelopes for the HTTP API. Engine values (`LearnOutcome`, `Insight`,
//! `VisualizationGraph`, `GraphView`) serialize themselves; this module only
//! adds the `success`/`error` envelope around them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ticketgraph_core::{EngineError, GraphMetadata, Insight, LayoutKind, LearnOutcome};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// LEARN RESPONSE
// =============================================================================

/// Acknowledgement of `POST /learn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: LearnOutcome,
}

impl From<LearnOutcome> for LearnResponse {
    fn from(outcome: LearnOutcome) -> Self {
        Self {
            success: true,
            outcome,
        }
    }
}

// =============================================================================
// INSIGHTS RESPONSE
// =============================================================================

/// Ranked insights over the current graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResponse {
    pub count: usize,
    pub insights: Vec<Insight>,
}

impl From<Vec<Insight>> for InsightsResponse {
    fn from(insights: Vec<Insight>) -> Self {
        Self {
            count: insights.len(),
            insights,
        }
    }
}

// =============================================================================
// VISUALIZATION QUERY
// =============================================================================

/// `GET /visualization?layout=<name>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisualizationQuery {
    /// Layout name, matched case-insensitively. Defaults to `force`.
    pub layout: Option<String>,
}

impl VisualizationQuery {
    #[must_use]
    pub fn layout_name(&self) -> &str {
        self.layout.as_deref().unwrap_or(LayoutKind::Force.as_str())
    }
}

// =============================================================================
// SNAPSHOT RESPONSE
// =============================================================================

/// Result of `POST /snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub success: bool,
    pub key: String,
    pub size_bytes: usize,
    /// BLAKE3 checksum (hex) of the canonical payload.
    pub checksum: String,
    pub metadata: GraphMetadata,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

/// Failure carried to the HTTP boundary.
#[derive(Debug)]
pub enum ApiError {
    /// The engine rejected or failed the operation.
    Engine(EngineError),
    /// The request body could not be decoded.
    BadRequest(String),
    /// No snapshot store is configured.
    Unavailable(String),
    /// A blocking worker task failed.
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(EngineError::Validation(_) | EngineError::InvalidArgument(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Engine(err) => err.to_string(),
            Self::BadRequest(msg) | Self::Unavailable(msg) | Self::Internal(msg) => msg.clone(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        } else {
            tracing::debug!(error = %message, "request rejected");
        }
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
