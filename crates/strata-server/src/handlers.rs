//! REST API handlers
//!
//! Any request that changes a view first locks it and takes its buffered
//! canvas, holding the lock until the change is stored, so a late autosave
//! can never undo it.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use strata_core::{
    DehydrateError, NodeId, NodeKind, RenderGraph, SnapshotId, SnapshotSummary, TimelineError,
    ValidationSummary, ViewId,
};
use strata_store::{
    Capture, CollisionChoice, NodeDeletion, NodeDraft, SaveOutcome, SnapshotDiff, StaticUi,
    StoreError,
};
use tracing::{debug, warn};

use crate::websocket::WsEvent;
use crate::{ServerState, autosave};

/// A store failure rendered as `{"error": ..}` with a fitting status.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists { .. } | StoreError::Cancelled(_) => StatusCode::CONFLICT,
            StoreError::InvalidName(_) => StatusCode::BAD_REQUEST,
            StoreError::VersionMismatch { .. }
            | StoreError::Integrity(_)
            | StoreError::Dehydrate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Timeline(e) => match e {
                TimelineError::NotFound(_) => StatusCode::NOT_FOUND,
                TimelineError::EmptyInput { .. } | TimelineError::OrderMismatch { .. } => {
                    StatusCode::BAD_REQUEST
                }
                TimelineError::LimitExceeded { .. }
                | TimelineError::LastItemProtected
                | TimelineError::StaleSnapshot { .. } => StatusCode::CONFLICT,
                TimelineError::Empty => StatusCode::INTERNAL_SERVER_ERROR,
            },
            StoreError::InvalidTimeline { .. }
            | StoreError::Config(_)
            | StoreError::Io(_)
            | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.0.is_expected() {
            tracing::error!("Request failed: {}", self.0);
        } else if status.is_server_error() {
            warn!("Request failed ({}): {}", status, self.0);
        } else {
            debug!("Request rejected ({}): {}", status, self.0);
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn list_views(State(state): State<Arc<ServerState>>) -> ApiResult<Json<Vec<ViewId>>> {
    Ok(Json(state.workspace.list_views().await?))
}

/// The view's current snapshot, including edits still waiting for autosave.
pub async fn get_view(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
) -> ApiResult<Json<RenderGraph>> {
    autosave::flush(&state, &view).await?;
    Ok(Json(state.workspace.render(&view).await?))
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub pending: bool,
}

/// Buffer a canvas for debounced saving.
pub async fn put_canvas(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
    Json(canvas): Json<RenderGraph>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    if canvas.view_id != view {
        return Err(StoreError::from(DehydrateError::ViewMismatch {
            expected: view,
            found: canvas.view_id,
        })
        .into());
    }
    autosave::schedule(&state, canvas);
    Ok((StatusCode::ACCEPTED, Json(Accepted { pending: true })))
}

pub async fn flush_view(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
) -> ApiResult<Json<Option<SaveOutcome>>> {
    Ok(Json(autosave::flush(&state, &view).await?))
}

pub async fn list_snapshots(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
) -> ApiResult<Json<Vec<SnapshotSummary>>> {
    Ok(Json(state.workspace.list_snapshots(&view).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateSnapshotRequest {
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Create a snapshot from the current one (plus any buffered edits) and
/// switch to it.
pub async fn create_snapshot(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
    Json(request): Json<CreateSnapshotRequest>,
) -> ApiResult<(StatusCode, Json<RenderGraph>)> {
    let (_lock, pending) = state.autosave.claim(&view).await;
    let capture = pending.as_ref().map_or(Capture::Stored, Capture::Canvas);
    let render = state
        .workspace
        .create_snapshot(
            &view,
            capture,
            &request.label,
            request.description.as_deref(),
            request.timestamp.as_deref(),
        )
        .await?;

    state.broadcast(WsEvent::SnapshotCreated {
        view: view.clone(),
        snapshot: render.snapshot_id.clone(),
        label: request.label.trim().to_string(),
    });
    Ok((StatusCode::CREATED, Json(render)))
}

/// Switch snapshots. The request body may carry the canvas as it is on
/// screen; otherwise the buffered canvas, if any, is captured.
pub async fn switch_snapshot(
    State(state): State<Arc<ServerState>>,
    Path((view, snapshot)): Path<(ViewId, SnapshotId)>,
    body: Option<Json<RenderGraph>>,
) -> ApiResult<Json<RenderGraph>> {
    let (_lock, pending) = state.autosave.claim(&view).await;
    let canvas = body.map(|Json(canvas)| canvas).or(pending);
    let capture = canvas.as_ref().map_or(Capture::Stored, Capture::Canvas);

    let render = state
        .workspace
        .switch_snapshot(&view, &snapshot, capture)
        .await?;

    state.broadcast(WsEvent::SnapshotSwitched {
        view,
        snapshot: render.snapshot_id.clone(),
    });
    Ok(Json(render))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub label: String,
}

pub async fn rename_snapshot(
    State(state): State<Arc<ServerState>>,
    Path((view, snapshot)): Path<(ViewId, SnapshotId)>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<StatusCode> {
    let _lock = autosave::settle(&state, &view).await?;
    state
        .workspace
        .rename_snapshot(&view, &snapshot, &request.label)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct DeleteSnapshotResponse {
    pub current: SnapshotId,
}

pub async fn delete_snapshot(
    State(state): State<Arc<ServerState>>,
    Path((view, snapshot)): Path<(ViewId, SnapshotId)>,
) -> ApiResult<Json<DeleteSnapshotResponse>> {
    let _lock = autosave::settle(&state, &view).await?;
    let current = state.workspace.delete_snapshot(&view, &snapshot).await?;
    state.broadcast(WsEvent::SnapshotDeleted {
        view,
        snapshot,
        current: current.clone(),
    });
    Ok(Json(DeleteSnapshotResponse { current }))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<SnapshotId>,
}

pub async fn reorder_snapshots(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<StatusCode> {
    let _lock = autosave::settle(&state, &view).await?;
    state
        .workspace
        .reorder_snapshots(&view, request.order)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: SnapshotId,
    #[serde(default)]
    pub to: Option<SnapshotId>,
}

pub async fn diff_snapshots(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<Json<SnapshotDiff>> {
    autosave::flush(&state, &view).await?;
    Ok(Json(
        state
            .workspace
            .diff_snapshots(&view, &query.from, query.to.as_ref())
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub view: Option<ViewId>,
}

pub async fn validate(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ValidateQuery>,
) -> ApiResult<Json<ValidationSummary>> {
    let report = state.workspace.validate(query.view.as_ref()).await?;
    Ok(Json(ValidationSummary::from(&report)))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnCollision {
    Reuse,
    Create,
    #[default]
    Cancel,
}

impl From<OnCollision> for CollisionChoice {
    fn from(choice: OnCollision) -> Self {
        match choice {
            OnCollision::Reuse => CollisionChoice::ReuseExisting,
            OnCollision::Create => CollisionChoice::CreateNew,
            OnCollision::Cancel => CollisionChoice::Cancel,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeRequest {
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// What to do if the label is already used in the pool.
    #[serde(default)]
    pub on_collision: OnCollision,
}

#[derive(Debug, Serialize)]
pub struct AddNodeResponse {
    pub id: NodeId,
}

pub async fn add_node(
    State(state): State<Arc<ServerState>>,
    Path(view): Path<ViewId>,
    Json(request): Json<AddNodeRequest>,
) -> ApiResult<(StatusCode, Json<AddNodeResponse>)> {
    let _lock = autosave::settle(&state, &view).await?;
    let ui = StaticUi::new(true, request.on_collision.into());
    let draft = NodeDraft {
        kind: request.kind,
        label: request.label,
        technology: request.technology,
        x: request.x,
        y: request.y,
    };
    let id = state.workspace.add_node(&view, draft, &ui).await?;
    Ok((StatusCode::CREATED, Json(AddNodeResponse { id })))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Delete a node everywhere. Requires `?confirm=true`.
pub async fn delete_node(
    State(state): State<Arc<ServerState>>,
    Path(node): Path<NodeId>,
    Query(query): Query<ConfirmQuery>,
) -> ApiResult<Json<NodeDeletion>> {
    // A buffered canvas that still shows the node would re-create it.
    let _locks = autosave::settle_all(&state).await;
    let ui = StaticUi::new(query.confirm, CollisionChoice::Cancel);
    let deletion = state.workspace.delete_node_globally(&node, &ui).await?;
    state.broadcast(WsEvent::NodeDeleted {
        node,
        views: deletion.views_touched.clone(),
    });
    Ok(Json(deletion))
}
