//! # API Endpoint Handlers
//!
//! Engine calls are synchronous and may wait on the graph lock, so every
//! handler that touches the engine runs it on the blocking pool.

use super::{
    AppState,
    types::{
        ApiError, HealthResponse, InsightsResponse, LearnResponse, SnapshotResponse,
        VisualizationQuery,
    },
};
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use ticketgraph_core::{GraphMetadata, GraphView, LearningData, VisualizationGraph};

/// Run `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// GRAPH HANDLERS
// =============================================================================

/// Owned copy of the whole graph.
pub async fn graph_handler(State(state): State<AppState>) -> Result<Json<GraphView>, ApiError> {
    let engine = state.engine.clone();
    blocking(move || Ok(engine.get_graph())).await.map(Json)
}

/// Graph counters only.
pub async fn metadata_handler(
    State(state): State<AppState>,
) -> Result<Json<GraphMetadata>, ApiError> {
    let engine = state.engine.clone();
    blocking(move || Ok(engine.snapshot_metadata()))
        .await
        .map(Json)
}

// =============================================================================
// LEARN HANDLER
// =============================================================================

/// Learn one resolved ticket.
pub async fn learn_handler(
    State(state): State<AppState>,
    payload: Result<Json<LearningData>, JsonRejection>,
) -> Result<Json<LearnResponse>, ApiError> {
    let Json(data) = payload
        .map_err(|e| ApiError::BadRequest(format!("invalid learning data: {}", e.body_text())))?;

    let engine = state.engine.clone();
    let outcome = blocking(move || Ok(engine.learn_from_ticket(&data)?)).await?;
    Ok(Json(LearnResponse::from(outcome)))
}

// =============================================================================
// INSIGHTS HANDLER
// =============================================================================

/// Ranked insights over the current graph.
pub async fn insights_handler(
    State(state): State<AppState>,
) -> Result<Json<InsightsResponse>, ApiError> {
    let engine = state.engine.clone();
    blocking(move || Ok(engine.generate_insights()))
        .await
        .map(|insights| Json(InsightsResponse::from(insights)))
}

// =============================================================================
// VISUALIZATION HANDLER
// =============================================================================

/// Positioned nodes and weighted edges for the requested layout.
pub async fn visualization_handler(
    State(state): State<AppState>,
    Query(query): Query<VisualizationQuery>,
) -> Result<Json<VisualizationGraph>, ApiError> {
    let layout = query.layout_name().to_string();
    let engine = state.engine.clone();
    blocking(move || Ok(engine.generate_visualization(&layout)?))
        .await
        .map(Json)
}

// =============================================================================
// SNAPSHOT HANDLER
// =============================================================================

/// Write the graph to the configured snapshot store.
pub async fn snapshot_handler(
    State(state): State<AppState>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let Some(store) = state.store.clone() else {
        return Err(ApiError::Unavailable(
            "no snapshot store configured".to_string(),
        ));
    };
    let engine = state.engine.clone();
    let key = state.snapshot_key.clone();

    let response = blocking(move || {
        let size_bytes = engine.save_snapshot(store.as_ref(), &key)?;
        Ok(SnapshotResponse {
            success: true,
            checksum: engine.snapshot_checksum()?,
            metadata: engine.snapshot_metadata(),
            key,
            size_bytes,
        })
    })
    .await?;

    tracing::info!(
        key = %response.key,
        size = response.size_bytes,
        "snapshot saved"
    );
    Ok(Json(response))
}
