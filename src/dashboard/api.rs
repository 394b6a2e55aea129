use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::{error, info};

use super::bd::BdCli;
use super::deps::{self, DependencyStore};
use super::hub::BroadcastHub;
use super::models::{
    CloseIssueRequest, CreateIssueRequest, DependencyTreeNode, Issue, UpdateIssueRequest,
};
use super::ws::WsMessage;
use crate::errors::{BdError, DependencyError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub cli: BdCli,
    pub deps: DependencyStore,
    pub hub: BroadcastHub,
}

impl AppState {
    pub fn new(cli: BdCli, hub: BroadcastHub) -> Self {
        let deps = DependencyStore::new(cli.workspace());
        Self { cli, deps, hub }
    }
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<BdError> for ApiError {
    fn from(err: BdError) -> Self {
        match &err {
            BdError::InvalidArgument(_) => ApiError::BadRequest(err.to_string()),
            _ if err.is_not_found() => ApiError::NotFound(err.to_string()),
            _ => {
                error!(error = %err, "bd command failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<DependencyError> for ApiError {
    fn from(err: DependencyError) -> Self {
        error!(error = %err, "dependency query failed");
        ApiError::Internal(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/health", get(health_check))
        .route(
            "/api/issues",
            get(list_issues).post(create_issue).patch(update_issue),
        )
        .route("/api/issues/ready", get(ready_issues))
        .route("/api/issues/blocked", get(blocked_issues))
        .route("/api/issues/{id}", get(get_issue))
        .route("/api/issues/{id}/close", post(close_issue))
        .route("/api/issues/{id}/dependencies", get(dependency_tree))
        .route("/api/graph", get(graph))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_issues(State(state): State<SharedState>) -> Result<Json<Vec<Issue>>, ApiError> {
    Ok(Json(state.cli.list_issues().await?))
}

/// Single issue with `depends_on` / `depended_by` attached.
async fn get_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Issue>, ApiError> {
    let (issue, rows) = tokio::try_join!(
        async { state.cli.get_issue(&id).await.map_err(ApiError::from) },
        async { state.deps.edges_for(&id).await.map_err(ApiError::from) },
    )?;
    let snapshot = state.hub.current_snapshot();
    Ok(Json(deps::enrich_issue(issue, &rows, &snapshot)))
}

async fn create_issue(
    State(state): State<SharedState>,
    Json(req): Json<CreateIssueRequest>,
) -> Result<(StatusCode, Json<Issue>), ApiError> {
    let issue = state.cli.create_issue(&req).await?;
    info!(id = %issue.id, "Issue created");
    state.hub.broadcast(&WsMessage::IssueCreated(issue.clone()));
    Ok((StatusCode::CREATED, Json(issue)))
}

async fn update_issue(
    State(state): State<SharedState>,
    Json(req): Json<UpdateIssueRequest>,
) -> Result<Json<Issue>, ApiError> {
    let issue = state.cli.update_issue(&req).await?;
    info!(id = %issue.id, "Issue updated");
    state.hub.broadcast(&WsMessage::IssueUpdated(issue.clone()));
    Ok(Json(issue))
}

/// The body is optional: no body, an empty body and `{}` all close without a
/// reason.
async fn close_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Issue>, ApiError> {
    let req: CloseIssueRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CloseIssueRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid close request: {}", e)))?
    };

    let issue = state.cli.close_issue(&id, req.reason.as_deref()).await?;
    info!(id = %issue.id, "Issue closed");
    state.hub.broadcast(&WsMessage::IssueUpdated(issue.clone()));
    Ok(Json(issue))
}

async fn ready_issues(State(state): State<SharedState>) -> Result<Json<Vec<Issue>>, ApiError> {
    Ok(Json(state.cli.ready_issues().await?))
}

async fn blocked_issues(State(state): State<SharedState>) -> Result<Json<Vec<Issue>>, ApiError> {
    Ok(Json(state.cli.blocked_issues().await?))
}

async fn dependency_tree(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DependencyTreeNode>>, ApiError> {
    Ok(Json(state.cli.dependency_tree(&id).await?))
}

/// Every issue in the current snapshot, enriched from one edge query.
async fn graph(State(state): State<SharedState>) -> Result<Json<Vec<Issue>>, ApiError> {
    let snapshot = state.hub.current_snapshot();
    let rows = state.deps.all_edges().await?;
    Ok(Json(deps::enrich_all(&snapshot, &rows)))
}

// ── Tests ─────────────────────────────────────────────────────────────
