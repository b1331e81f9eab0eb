use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use strata_core::{DiagramType, NodeId, NodeKind, RenderGraph, SnapshotId, TimelineError, ViewId};
use strata_store::{
    CollisionChoice, MemoryFiles, NodeDraft, StaticUi, StoreConfig, StoreError, Workspace,
};

use crate::handlers::{self, ApiError, ConfirmQuery, CreateSnapshotRequest};
use crate::router::create_router;
use crate::websocket::{WsEnvelope, WsEvent};
use crate::ServerState;

fn context() -> ViewId {
    ViewId::from("context")
}

/// Server state over in-memory files with a `context` view showing two
/// systems.
async fn server(autosave_ms: u64) -> (Arc<ServerState>, NodeId) {
    let config = StoreConfig {
        autosave_ms,
        ..StoreConfig::default()
    };
    let workspace = Workspace::new(Arc::new(MemoryFiles::new()), config);
    workspace.init(Some("Landscape")).await.unwrap();
    workspace
        .create_view("context", "Context", DiagramType::Context)
        .await
        .unwrap();

    let ui = StaticUi::new(true, CollisionChoice::Cancel);
    let a = workspace
        .add_node(&context(), draft("System A", 100.0), &ui)
        .await
        .unwrap();
    workspace
        .add_node(&context(), draft("System B", 400.0), &ui)
        .await
        .unwrap();

    (Arc::new(ServerState::new(Arc::new(workspace))), a)
}

fn draft(label: &str, x: f64) -> NodeDraft {
    NodeDraft {
        kind: NodeKind::System,
        label: label.to_string(),
        technology: None,
        x,
        y: 100.0,
    }
}

async fn canvas_with_label(state: &ServerState, node: &NodeId, label: &str) -> RenderGraph {
    let mut canvas = state.workspace.render(&context()).await.unwrap();
    canvas.node_mut(node).unwrap().label = label.to_string();
    canvas
}

fn saved_events(rx: &mut tokio::sync::broadcast::Receiver<String>) -> usize {
    let mut saved = 0;
    while let Ok(json) = rx.try_recv() {
        let envelope: WsEnvelope = serde_json::from_str(&json).unwrap();
        if matches!(envelope.event, WsEvent::ViewSaved { .. }) {
            saved += 1;
        }
    }
    saved
}

#[test]
fn test_event_envelope_is_flat_and_tagged() {
    let envelope = WsEnvelope {
        sequence: 7,
        event: WsEvent::SnapshotSwitched {
            view: context(),
            snapshot: SnapshotId::from("s2"),
        },
    };
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["type"], "snapshot_switched");
    assert_eq!(value["sequence"], 7);
    assert_eq!(value["view"], "context");
    assert_eq!(value["snapshot"], "s2");
}

#[tokio::test]
async fn test_broadcast_numbers_events_in_order() {
    let (state, a) = server(1_000).await;
    let mut rx = state.events_tx.subscribe();

    state.broadcast(WsEvent::NodeDeleted {
        node: a,
        views: vec![],
    });
    state.broadcast(WsEvent::SaveFailed {
        view: context(),
        message: "disk full".to_string(),
    });

    let first: WsEnvelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    let second: WsEnvelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(first.sequence + 1, second.sequence);
    assert!(matches!(second.event, WsEvent::SaveFailed { .. }));
}

#[tokio::test]
async fn test_debounced_saves_coalesce() {
    let (state, a) = server(30).await;
    let mut rx = state.events_tx.subscribe();

    for label in ["first draft", "second draft"] {
        let canvas = canvas_with_label(&state, &a, label).await;
        let (status, _) = handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    assert!(state.autosave.is_pending(&context()));

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!state.autosave.is_pending(&context()));
    assert_eq!(saved_events(&mut rx), 1);
    let stored = state.workspace.render(&context()).await.unwrap();
    assert_eq!(stored.node(&a).unwrap().label, "second draft");
}

#[tokio::test]
async fn test_flush_saves_immediately() {
    let (state, a) = server(60_000).await;
    let canvas = canvas_with_label(&state, &a, "Flushed").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();

    let Json(outcome) = handlers::flush_view(State(state.clone()), Path(context()))
        .await
        .unwrap();
    assert!(outcome.is_some());

    let Json(again) = handlers::flush_view(State(state.clone()), Path(context()))
        .await
        .unwrap();
    assert!(again.is_none());

    let stored = state.workspace.render(&context()).await.unwrap();
    assert_eq!(stored.node(&a).unwrap().label, "Flushed");
}

#[tokio::test]
async fn test_get_view_includes_buffered_edits() {
    let (state, a) = server(60_000).await;
    let canvas = canvas_with_label(&state, &a, "Pending").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();

    let Json(view) = handlers::get_view(State(state.clone()), Path(context()))
        .await
        .unwrap();
    assert_eq!(view.node(&a).unwrap().label, "Pending");
}

#[tokio::test]
async fn test_switch_captures_buffered_canvas() {
    let (state, a) = server(60_000).await;
    let Json(before) = handlers::list_snapshots(State(state.clone()), Path(context()))
        .await
        .unwrap();
    let first = before[0].id.clone();

    let (status, Json(created)) = handlers::create_snapshot(
        State(state.clone()),
        Path(context()),
        Json(CreateSnapshotRequest {
            label: "Target state".to_string(),
            description: None,
            timestamp: Some("2027".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    let second = created.snapshot_id.clone();

    let canvas = canvas_with_label(&state, &a, "Renamed in 2027").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();

    let Json(shown) = handlers::switch_snapshot(
        State(state.clone()),
        Path((context(), first.clone())),
        None,
    )
    .await
    .unwrap();
    assert_eq!(shown.snapshot_id, first);
    assert_eq!(shown.node(&a).unwrap().label, "System A");
    assert!(!state.autosave.is_pending(&context()));

    let Json(back) = handlers::switch_snapshot(State(state.clone()), Path((context(), second)), None)
        .await
        .unwrap();
    assert_eq!(back.node(&a).unwrap().label, "Renamed in 2027");
}

#[tokio::test]
async fn test_put_canvas_rejects_other_view() {
    let (state, _) = server(60_000).await;
    let canvas = state.workspace.render(&context()).await.unwrap();

    let err = handlers::put_canvas(State(state.clone()), Path(ViewId::from("other")), Json(canvas))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!state.autosave.is_pending(&ViewId::from("other")));
    assert!(!state.autosave.is_pending(&context()));
}

#[tokio::test]
async fn test_delete_node_requires_confirmation() {
    let (state, a) = server(60_000).await;

    let err = handlers::delete_node(
        State(state.clone()),
        Path(a.clone()),
        Query(ConfirmQuery { confirm: false }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);

    let Json(deletion) = handlers::delete_node(
        State(state.clone()),
        Path(a.clone()),
        Query(ConfirmQuery { confirm: true }),
    )
    .await
    .unwrap();
    assert_eq!(deletion.views_touched, vec![context()]);

    let stored = state.workspace.render(&context()).await.unwrap();
    assert!(stored.node(&a).is_none());
}

#[tokio::test]
async fn test_delete_node_wins_over_buffered_canvas() {
    let (state, a) = server(60_000).await;
    let canvas = canvas_with_label(&state, &a, "Still here").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();

    handlers::delete_node(
        State(state.clone()),
        Path(a.clone()),
        Query(ConfirmQuery { confirm: true }),
    )
    .await
    .unwrap();

    assert!(!state.autosave.is_pending(&context()));
    let pool = state.workspace.entities().read().await.unwrap();
    assert!(pool.node(&a).is_none());
}

#[tokio::test]
async fn test_switch_waits_for_save_in_flight() {
    let (state, a) = server(20).await;
    let Json(before) = handlers::list_snapshots(State(state.clone()), Path(context()))
        .await
        .unwrap();
    let first = before[0].id.clone();
    let (_, Json(created)) = handlers::create_snapshot(
        State(state.clone()),
        Path(context()),
        Json(CreateSnapshotRequest {
            label: "Target state".to_string(),
            description: None,
            timestamp: None,
        }),
    )
    .await
    .unwrap();
    let second = created.snapshot_id.clone();

    let canvas = canvas_with_label(&state, &a, "Edited in target").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();

    // The timer fires and queues on the view; the switch queues behind it.
    let lock = state.autosave.lock(&context()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let switch = tokio::spawn({
        let state = state.clone();
        let first = first.clone();
        async move {
            handlers::switch_snapshot(State(state), Path((context(), first)), None)
                .await
                .map(|Json(render)| render)
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!switch.is_finished());
    drop(lock);

    let shown = switch.await.unwrap().unwrap();
    assert_eq!(shown.snapshot_id, first);
    assert!(!state.autosave.is_pending(&context()));

    let Json(back) = handlers::switch_snapshot(State(state.clone()), Path((context(), second)), None)
        .await
        .unwrap();
    assert_eq!(back.node(&a).unwrap().label, "Edited in target");
}

#[tokio::test]
async fn test_delete_node_waits_for_save_in_flight() {
    let (state, a) = server(20).await;
    let canvas = canvas_with_label(&state, &a, "Still here").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();

    let lock = state.autosave.lock(&context()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let delete = tokio::spawn({
        let state = state.clone();
        let node = a.clone();
        async move {
            handlers::delete_node(State(state), Path(node), Query(ConfirmQuery { confirm: true }))
                .await
                .map(|Json(deletion)| deletion)
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!delete.is_finished());
    drop(lock);

    let deletion = delete.await.unwrap().unwrap();
    assert_eq!(deletion.views_touched, vec![context()]);
    let pool = state.workspace.entities().read().await.unwrap();
    assert!(pool.node(&a).is_none());
    let stored = state.workspace.render(&context()).await.unwrap();
    assert!(stored.node(&a).is_none());
}

#[test]
fn test_error_status_mapping() {
    let status = |e: StoreError| ApiError(e).status();

    assert_eq!(status(StoreError::not_found("view", "x")), StatusCode::NOT_FOUND);
    assert_eq!(
        status(TimelineError::NotFound(SnapshotId::from("s9")).into()),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status(TimelineError::LastItemProtected.into()),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status(TimelineError::LimitExceeded { limit: 21 }.into()),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status(TimelineError::EmptyInput { field: "label" }.into()),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status(StoreError::InvalidName("../etc".to_string())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status(StoreError::Cancelled("adding".to_string())),
        StatusCode::CONFLICT
    );
}

#[test]
fn test_only_storage_failures_are_unexpected() {
    assert!(StoreError::InvalidName("a b".to_string()).is_expected());
    assert!(StoreError::from(TimelineError::LastItemProtected).is_expected());
    assert!(!StoreError::Io(std::io::Error::other("disk full")).is_expected());
}

#[tokio::test]
async fn test_health_check() {
    let response = handlers::health_check().await.into_response();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_router_creation() {
    let (state, _) = server(1_000).await;
    let _router = create_router(state);
}

#[tokio::test]
async fn test_autosave_reaches_disk() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(dir.path()).unwrap();
    workspace.init(None).await.unwrap();
    workspace
        .create_view("context", "Context", DiagramType::Context)
        .await
        .unwrap();
    let ui = StaticUi::new(true, CollisionChoice::Cancel);
    let a = workspace
        .add_node(&context(), draft("System A", 100.0), &ui)
        .await
        .unwrap();
    let state = Arc::new(ServerState::new(Arc::new(workspace)));

    let canvas = canvas_with_label(&state, &a, "On disk").await;
    handlers::put_canvas(State(state.clone()), Path(context()), Json(canvas))
        .await
        .unwrap();
    crate::autosave::flush_all(&state).await;

    let reopened = Workspace::open(dir.path()).unwrap();
    let stored = reopened.render(&context()).await.unwrap();
    assert_eq!(stored.node(&a).unwrap().label, "On disk");
    assert!(dir.path().join("views").join("context.json").exists());
}
