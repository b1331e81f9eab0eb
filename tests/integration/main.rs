//! Integration tests for Strata
//!
//! These tests drive the workspace over real files, the way the CLI and
//! server do.

use std::path::Path;
use std::process::Command;

use serde_json::json;
use strata_core::{DiagramType, NodeId, NodeKind, RenderEdge, RenderGraph, ViewId};
use strata_store::{
    Capture, CollisionChoice, NodeDraft, StaticUi, StoreError, Workspace,
};
use tempfile::TempDir;

fn draft(kind: NodeKind, label: &str, x: f64) -> NodeDraft {
    NodeDraft {
        kind,
        label: label.to_string(),
        technology: None,
        x,
        y: 200.0,
    }
}

fn edge(id: &str, source: &NodeId, target: &NodeId, kind: &str) -> RenderEdge {
    serde_json::from_value(json!({
        "id": id,
        "source": source,
        "target": target,
        "type": kind,
    }))
    .unwrap()
}

fn without(canvas: &mut RenderGraph, node: &NodeId) {
    canvas.nodes.retain(|n| &n.id != node);
    canvas
        .edges
        .retain(|e| &e.source != node && &e.target != node);
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// A landscape evolves across two snapshots without either snapshot or the
/// shared pool losing anything.
#[tokio::test]
async fn test_landscape_evolves_across_snapshots() {
    let dir = TempDir::new().unwrap();
    let workspace = Workspace::open(dir.path()).unwrap();
    let ui = StaticUi::new(true, CollisionChoice::Cancel);
    let view = ViewId::from("landscape");

    assert!(workspace.init(Some("Shop")).await.unwrap());
    workspace
        .create_view("landscape", "Shop landscape", DiagramType::Landscape)
        .await
        .unwrap();

    let web = workspace
        .add_node(&view, draft(NodeKind::Container, "Web App", 100.0), &ui)
        .await
        .unwrap();
    let db = workspace
        .add_node(&view, draft(NodeKind::Database, "Orders DB", 400.0), &ui)
        .await
        .unwrap();
    let payments = workspace
        .add_node(&view, draft(NodeKind::System, "Payments", 700.0), &ui)
        .await
        .unwrap();

    let mut canvas = workspace.render(&view).await.unwrap();
    canvas.edges.push(edge("web-db", &web, &db, "uses"));
    canvas.edges.push(edge("web-payments", &web, &payments, "calls"));
    workspace.save_canvas(&canvas).await.unwrap();
    let today = canvas.snapshot_id.clone();

    // The future state drops payments and renames the web app.
    let mut canvas = workspace
        .create_snapshot(&view, Capture::Stored, "Target", None, Some("2027"))
        .await
        .unwrap();
    assert_ne!(canvas.snapshot_id, today);
    without(&mut canvas, &payments);
    canvas.node_mut(&web).unwrap().label = "Web Portal".to_string();
    workspace.save_canvas(&canvas).await.unwrap();

    let cache = workspace
        .add_node(&view, draft(NodeKind::Queue, "Cache", 400.0), &ui)
        .await
        .unwrap();
    let mut canvas = workspace.render(&view).await.unwrap();
    canvas.edges.push(edge("web-cache", &web, &cache, "reads_from"));
    workspace.save_canvas(&canvas).await.unwrap();

    let diff = workspace.diff_snapshots(&view, &today, None).await.unwrap();
    insta::assert_snapshot!(diff.summary.join("\n"), @r"
    + node Cache
    ~ node Web Portal
    - node Payments
    + edge Web Portal reads from Cache
    - edge Web App calls Payments
    ");

    // The pool keeps every node and its original label.
    let pool = workspace.entities().read().await.unwrap();
    assert_eq!(pool.node(&web).unwrap().label, "Web App");
    assert!(pool.node(&payments).is_some());
    assert_eq!(pool.nodes.len(), 4);

    // Today's snapshot is untouched.
    let past = workspace
        .switch_snapshot(&view, &today, Capture::Stored)
        .await
        .unwrap();
    assert_eq!(past.nodes.len(), 3);
    assert_eq!(past.node(&web).unwrap().label, "Web App");
    assert!(past.edges.iter().any(|e| e.id.as_str() == "web-payments"));
    assert!(past.node(&cache).is_none());

    // Both files carry their format version and the view file holds both
    // snapshots.
    let entities = read_json(&dir.path().join("entities.json"));
    assert_eq!(entities["version"], "1.0");
    let stored = read_json(&dir.path().join("views").join("landscape.json"));
    assert_eq!(stored["version"], "1.0");
    assert_eq!(stored["timeline"]["snapshotOrder"].as_array().unwrap().len(), 2);
    assert_eq!(stored["timeline"]["currentSnapshotId"], json!(today));
}

#[tokio::test]
async fn test_reopened_workspace_sees_saved_state() {
    let dir = TempDir::new().unwrap();
    let view = ViewId::from("context");
    {
        let workspace = Workspace::open(dir.path()).unwrap();
        workspace.init(None).await.unwrap();
        workspace
            .create_view("context", "Context", DiagramType::Context)
            .await
            .unwrap();
        workspace
            .add_node(
                &view,
                draft(NodeKind::Person, "Customer", 0.0),
                &StaticUi::new(true, CollisionChoice::Cancel),
            )
            .await
            .unwrap();
        workspace
            .create_snapshot(&view, Capture::Stored, "Later", None, None)
            .await
            .unwrap();
    }

    let workspace = Workspace::open(dir.path()).unwrap();
    let snapshots = workspace.list_snapshots(&view).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[1].is_current);
    assert_eq!(snapshots[1].label, "Later");
    assert_eq!(snapshots[1].node_count, 1);
    assert!(workspace.validate(None).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_corrupt_view_file_is_refused() {
    let dir = TempDir::new().unwrap();
    let workspace = Workspace::open(dir.path()).unwrap();
    workspace.init(None).await.unwrap();
    workspace
        .create_view("context", "Context", DiagramType::Context)
        .await
        .unwrap();

    let path = dir.path().join("views").join("context.json");
    let mut value = read_json(&path);
    value["version"] = json!("2.0");
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let reopened = Workspace::open(dir.path()).unwrap();
    let err = reopened.render(&ViewId::from("context")).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionMismatch { .. }));
}

fn strata(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute strata")
}

#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("--help")
        .output()
        .expect("Failed to execute strata");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Versioned architecture diagrams"));
}

#[test]
fn test_cli_timeline_workflow() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    assert!(strata(root, &["init", "--title", "Shop"]).status.success());
    assert!(
        strata(root, &["view", "create", "context", "--title", "Context"])
            .status
            .success()
    );
    assert!(strata(root, &["node", "add", "context", "API"]).status.success());
    assert!(
        strata(root, &["snapshot", "create", "context", "Next", "--timestamp", "2027"])
            .status
            .success()
    );

    let listing = strata(root, &["snapshot", "list", "context"]);
    assert!(listing.status.success());
    let stdout = String::from_utf8_lossy(&listing.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with('*'));
    assert!(lines[1].contains("Next"));

    assert!(strata(root, &["validate"]).status.success());

    let missing = strata(root, &["snapshot", "switch", "context", "nope"]);
    assert!(!missing.status.success());
}
