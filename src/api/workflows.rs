/// Workflow REST API endpoints
///
/// Thin mirror of the sync engine for operators and tools. Every handler
/// returns the engine's result, or `500` with `{ "error": message }`.

use crate::session::SessionHub;
use crate::sync::{SyncEngine, SyncError};
use crate::workflow::Workflow;
use crate::workflow::is_valid_workflow_id;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// The one writer of local and remote workflow copies
    pub engine: Arc<SyncEngine>,
    /// Live session registry
    pub hub: Arc<SessionHub>,
}

/// Engine failure rendered as `500 { "error": ... }`
#[derive(Debug)]
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("❌ Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `{id}` path segment, refused with `400` unless it can name a snapshot file
pub struct WorkflowId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for WorkflowId {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if !is_valid_workflow_id(&id) {
            tracing::warn!("⚠️ Rejected invalid workflow id {:?}", id);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid workflow id {:?}", id) })),
            )
                .into_response());
        }
        Ok(WorkflowId(id))
    }
}

/// Create workflow routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows))
        .route("/workflow/{id}", get(get_workflow).put(put_workflow))
        .route("/workflow/{id}/sync", post(sync_workflow))
        .route("/workflow/{id}/pull", post(pull_workflow))
        .route("/workflow/{id}/activate", post(activate_workflow))
        .route("/workflow/{id}/deactivate", post(deactivate_workflow))
        .route("/workflow/{id}/execute", post(execute_workflow))
        .route("/sessions", get(list_sessions))
}

/// GET /workflows
async fn list_workflows(State(state): State<AppState>) -> ApiResult<Value> {
    let workflows = state.engine.list().await?;
    Ok(Json(json!({ "data": workflows })))
}

/// GET /workflow/{id}
/// Returns the remote copy as-is
async fn get_workflow(State(state): State<AppState>, WorkflowId(id): WorkflowId) -> ApiResult<Workflow> {
    Ok(Json(state.engine.fetch(&id).await?))
}

/// PUT /workflow/{id}
/// Body: full workflow. Replaces the remote copy, then the local file and
/// every subscribed session receive the stored result.
async fn put_workflow(
    State(state): State<AppState>,
    WorkflowId(id): WorkflowId,
    Json(workflow): Json<Workflow>,
) -> ApiResult<Workflow> {
    let stored = state.engine.publish(&id, workflow).await?;
    tracing::info!("🔥 Published workflow {} via API", id);
    Ok(Json(stored))
}

/// POST /workflow/{id}/sync
/// Pushes the local snapshot to the remote
async fn sync_workflow(State(state): State<AppState>, WorkflowId(id): WorkflowId) -> ApiResult<Value> {
    let stored = state.engine.push(&id).await?;
    Ok(Json(json!({
        "message": format!("Workflow {} synced successfully", id),
        "workflow": stored,
    })))
}

/// POST /workflow/{id}/pull
/// Downloads the remote copy into the local file and sessions
async fn pull_workflow(State(state): State<AppState>, WorkflowId(id): WorkflowId) -> ApiResult<Value> {
    let report = state.engine.pull(&id).await?;
    Ok(Json(json!(report)))
}

async fn activate_workflow(State(state): State<AppState>, WorkflowId(id): WorkflowId) -> ApiResult<Workflow> {
    Ok(Json(state.engine.activate(&id).await?))
}

async fn deactivate_workflow(State(state): State<AppState>, WorkflowId(id): WorkflowId) -> ApiResult<Workflow> {
    Ok(Json(state.engine.deactivate(&id).await?))
}

/// POST /workflow/{id}/execute
/// Body: optional JSON input data
async fn execute_workflow(
    State(state): State<AppState>,
    WorkflowId(id): WorkflowId,
    body: String,
) -> Result<Json<Value>, Response> {
    let input: Value = if body.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("❌ Invalid execution input for {}: {}", id, e);
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        })?
    };
    let result = state
        .engine
        .execute(&id, &input)
        .await
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(result))
}

/// GET /sessions
async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "count": state.hub.session_count().await,
        "sessions": state.hub.sessions().await,
    }))
}
