//! REST API for the crosscheck conflict review system
//!
//! HTTP endpoints over the review engine: value writes, conflict reads,
//! resolution, and the downstream gate.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use crosscheck_core::{
    Conflict, ConflictDetail, ConflictId, ConflictKind, ConflictStatus, DocumentRef, FieldValue,
    Priority, RecordId, Resolution, SourceKind, TypedValue,
};
use crosscheck_engine::{
    Engine, EngineConfig, EngineError, GateSummary, NewValue, ResolutionRequest, TriggerMode,
    WriteRequest,
};
use crosscheck_storage::memory::{InMemoryConflictStore, InMemoryValueStore};
use crosscheck_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// API state holding the review engine
#[derive(Clone)]
pub struct ApiState {
    engine: Arc<Engine<InMemoryValueStore, InMemoryConflictStore>>,
}

impl ApiState {
    /// Create a new API state with default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create API state with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let values = InMemoryValueStore::new();
        let conflicts = InMemoryConflictStore::new();
        let engine = Engine::new(values, conflicts, config);

        Self {
            engine: Arc::new(engine),
        }
    }
}

impl Default for ApiState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the main API router with default configuration
pub fn create_router() -> Router {
    create_router_with_config(EngineConfig::default())
}

/// Create the main API router with custom engine configuration
pub fn create_router_with_config(config: EngineConfig) -> Router {
    let state = ApiState::with_config(config);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Value ledger
        .route("/records/{id}/values", post(save_value))
        .route("/records/{id}/values", get(list_values))
        // Conflict cache
        .route("/records/{id}/conflicts", get(get_conflicts))
        .route("/records/{id}/conflicts/refresh", post(refresh_conflicts))
        // Downstream gate
        .route("/records/{id}/gate", get(get_gate))
        // Resolution workflow
        .route("/conflicts/{id}/resolve", post(resolve_conflict))
        .route("/conflicts/{id}/defer", post(defer_conflict))
        .route("/conflicts/{id}/reject", post(reject_conflict))
        // System operations
        .route("/system/stats", get(get_stats))
        .route("/system/trigger-mode", get(get_trigger_mode))
        .route("/system/trigger-mode", put(set_trigger_mode))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveValueRequest {
    pub field_name: String,
    pub value: TypedValue,
    pub source: SourceKind,
    pub confidence: Option<f64>,
    pub document: Option<DocumentRef>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub actor: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListValuesQuery {
    /// Unqualified reads return only active values; pass
    /// `active_only=false` for the full audit history.
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

fn default_active_only() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub winning_value_ids: Vec<String>,
    pub new_value: Option<NewValueDto>,
    pub notes: Option<String>,
    pub actor: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewValueDto {
    pub field_name: String,
    pub value: TypedValue,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseRequest {
    pub notes: Option<String>,
    pub actor: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerModeRequest {
    pub mode: String,
}

// Response types
#[derive(Debug, Serialize)]
pub struct ValueResponse {
    pub id: String,
    pub record_id: String,
    pub field_name: String,
    pub value: TypedValue,
    pub source: SourceKind,
    pub confidence: Option<f64>,
    pub document: Option<DocumentRef>,
    pub active: bool,
    pub created_at: String,
    pub created_by: String,
}

impl From<FieldValue> for ValueResponse {
    fn from(value: FieldValue) -> Self {
        Self {
            id: value.id.to_string(),
            record_id: value.record_id.to_string(),
            field_name: value.field_name,
            value: value.value,
            source: value.source,
            confidence: value.confidence,
            document: value.document,
            active: value.active,
            created_at: value.created_at.to_rfc3339(),
            created_by: value.created_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub id: String,
    pub record_id: String,
    pub kind: ConflictKind,
    pub field_name: Option<String>,
    pub priority: Priority,
    pub status: ConflictStatus,
    pub value_ids: Vec<String>,
    pub detail: ConflictDetail,
    pub resolution: Option<Resolution>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub detected_at: String,
    pub stale: bool,
}

impl From<Conflict> for ConflictResponse {
    fn from(conflict: Conflict) -> Self {
        Self {
            id: conflict.id.to_string(),
            record_id: conflict.record_id.to_string(),
            kind: conflict.kind,
            field_name: conflict.field_name,
            priority: conflict.priority,
            status: conflict.status,
            value_ids: conflict.value_ids.iter().map(|v| v.to_string()).collect(),
            detail: conflict.detail,
            resolution: conflict.resolution,
            reviewed_by: conflict.reviewed_by,
            reviewed_at: conflict.reviewed_at.map(|t| t.to_rfc3339()),
            detected_at: conflict.detected_at.to_rfc3339(),
            stale: conflict.stale,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GateResponse {
    pub blocking: bool,
    pub pending: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub resolved: usize,
    pub deferred: usize,
}

impl GateResponse {
    fn from_summary(summary: GateSummary, blocking: bool) -> Self {
        Self {
            blocking,
            pending: summary.pending,
            high: summary.by_priority.high,
            medium: summary.by_priority.medium,
            low: summary.by_priority.low,
            resolved: summary.resolved,
            deferred: summary.deferred,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_values: u64,
    pub active_values: u64,
    pub total_conflicts: u64,
    pub pending_conflicts: u64,
    pub detection_passes: u64,
    pub resolutions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::Storage(StorageError::ValueNotFound(_))
            | EngineError::Storage(StorageError::ConflictNotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            EngineError::ConflictState { .. } | EngineError::Concurrency(_) => {
                ApiError::Conflict(err.to_string())
            }
            EngineError::Storage(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

fn parse_record_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid record ID".to_string()))
}

fn parse_conflict_id(raw: &str) -> Result<ConflictId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid conflict ID".to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "Crosscheck Conflict Review"
    }))
}

/// Append a provenance-tagged value to a record
async fn save_value(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<SaveValueRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let record_id = parse_record_id(&id)?;

    let value_id = state
        .engine
        .save_value(WriteRequest {
            record_id,
            field_name: req.field_name,
            value: req.value,
            source: req.source,
            confidence: req.confidence,
            document: req.document,
            metadata: req.metadata,
            actor: req.actor,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": value_id.to_string()
        })),
    ))
}

/// List the values of a record
async fn list_values(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ListValuesQuery>,
) -> Result<Json<Vec<ValueResponse>>, ApiError> {
    let record_id = parse_record_id(&id)?;

    let values = state.engine.list_values(record_id, query.active_only).await?;
    let response: Vec<ValueResponse> = values.into_iter().map(ValueResponse::from).collect();

    Ok(Json(response))
}

/// Conflicts for a record, served from cache when fresh
async fn get_conflicts(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConflictResponse>>, ApiError> {
    let record_id = parse_record_id(&id)?;

    let conflicts = state.engine.get_conflicts(record_id).await?;
    let response: Vec<ConflictResponse> =
        conflicts.into_iter().map(ConflictResponse::from).collect();

    Ok(Json(response))
}

/// Force a detection pass regardless of cache freshness
async fn refresh_conflicts(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConflictResponse>>, ApiError> {
    let record_id = parse_record_id(&id)?;

    let conflicts = state.engine.force_refresh(record_id).await?;
    let response: Vec<ConflictResponse> =
        conflicts.into_iter().map(ConflictResponse::from).collect();

    Ok(Json(response))
}

/// Gate summary for precondition checks
async fn get_gate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<GateResponse>, ApiError> {
    let record_id = parse_record_id(&id)?;

    let summary = state.engine.summary(record_id).await?;
    let blocking = state.engine.has_blocking(record_id).await?;

    Ok(Json(GateResponse::from_summary(summary, blocking)))
}

/// Approve a pending conflict
async fn resolve_conflict(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ConflictResponse>, ApiError> {
    let conflict_id = parse_conflict_id(&id)?;

    let mut winning_value_ids = Vec::with_capacity(req.winning_value_ids.len());
    for raw in &req.winning_value_ids {
        let id = raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid value ID: {raw}")))?;
        winning_value_ids.push(id);
    }

    let resolved = state
        .engine
        .resolve(
            conflict_id,
            ResolutionRequest {
                winning_value_ids,
                new_value: req.new_value.map(|nv| NewValue {
                    field_name: nv.field_name,
                    value: nv.value,
                }),
                notes: req.notes,
            },
            &req.actor,
        )
        .await?;

    Ok(Json(ConflictResponse::from(resolved)))
}

/// Set a pending conflict aside for later review
async fn defer_conflict(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CloseRequest>,
) -> Result<Json<ConflictResponse>, ApiError> {
    let conflict_id = parse_conflict_id(&id)?;

    let deferred = state.engine.defer(conflict_id, req.notes, &req.actor).await?;

    Ok(Json(ConflictResponse::from(deferred)))
}

/// Dismiss a pending conflict as a false positive
async fn reject_conflict(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CloseRequest>,
) -> Result<Json<ConflictResponse>, ApiError> {
    let conflict_id = parse_conflict_id(&id)?;

    let rejected = state.engine.reject(conflict_id, req.notes, &req.actor).await?;

    Ok(Json(ConflictResponse::from(rejected)))
}

/// Combined engine and storage statistics
async fn get_stats(State(state): State<ApiState>) -> Result<Json<StatsResponse>, ApiError> {
    let engine_stats = state.engine.get_stats();
    let storage_stats = state.engine.storage_stats().await?;

    Ok(Json(StatsResponse {
        total_values: storage_stats.total_values,
        active_values: storage_stats.active_values,
        total_conflicts: storage_stats.total_conflicts,
        pending_conflicts: storage_stats.pending_conflicts,
        detection_passes: engine_stats.detection_passes,
        resolutions: engine_stats.resolutions,
        cache_hits: engine_stats.cache_hits,
        cache_misses: engine_stats.cache_misses,
    }))
}

/// Current trigger mode
async fn get_trigger_mode(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "mode": state.engine.trigger_mode().to_string()
    }))
}

/// Switch trigger mode at runtime. Unknown names fall back to immediate.
async fn set_trigger_mode(
    State(state): State<ApiState>,
    Json(req): Json<TriggerModeRequest>,
) -> Json<serde_json::Value> {
    let mode = TriggerMode::parse(&req.mode);
    state.engine.set_trigger_mode(mode);

    Json(serde_json::json!({
        "mode": state.engine.trigger_mode().to_string()
    }))
}
