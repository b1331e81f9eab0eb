//! CLI command implementations

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use strata_core::{DiagramType, NodeId, NodeKind, SnapshotId, ValidationSummary, ViewId};
use strata_server::{ServerConfig, StrataServer};
use strata_store::{Capture, CollisionChoice, NodeDraft, StaticUi, UiPort, Workspace};

fn open(root: &Path) -> anyhow::Result<Workspace> {
    Workspace::open(root).with_context(|| format!("opening workspace at {}", root.display()))
}

/// Parse a lowercase tag the way the file format spells it.
fn parse_tag<T: DeserializeOwned>(tag: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(tag.to_lowercase()))
        .with_context(|| format!("unknown value {:?}", tag))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn init(root: &Path, title: Option<String>) -> anyhow::Result<()> {
    let workspace = open(root)?;
    if workspace.init(title.as_deref()).await? {
        println!("Initialized entity pool in {}", root.display());
    } else {
        println!("Entity pool already exists in {}", root.display());
    }
    Ok(())
}

pub async fn create_view(root: &Path, id: &str, title: &str, diagram_type: &str) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let diagram_type: DiagramType = parse_tag(diagram_type)?;
    let view = workspace.create_view(id, title, diagram_type).await?;
    println!("Created view {} ({})", view.id, view.metadata.title);
    Ok(())
}

pub async fn list_views(root: &Path) -> anyhow::Result<()> {
    let workspace = open(root)?;
    for view in workspace.list_views().await? {
        println!("{}", view);
    }
    Ok(())
}

pub async fn render(root: &Path, view: &str) -> anyhow::Result<()> {
    let workspace = open(root)?;
    print_json(&workspace.render(&ViewId::from(view)).await?)
}

pub async fn list_snapshots(root: &Path, view: &str) -> anyhow::Result<()> {
    let workspace = open(root)?;
    for summary in workspace.list_snapshots(&ViewId::from(view)).await? {
        let marker = if summary.is_current { "*" } else { " " };
        let when = summary.timestamp.as_deref().unwrap_or("-");
        println!(
            "{} {}  {:<24} {:<12} {} nodes, {} edges",
            marker, summary.id, summary.label, when, summary.node_count, summary.edge_count
        );
    }
    Ok(())
}

pub async fn create_snapshot(
    root: &Path,
    view: &str,
    label: &str,
    description: Option<String>,
    timestamp: Option<String>,
) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let render = workspace
        .create_snapshot(
            &ViewId::from(view),
            Capture::Stored,
            label,
            description.as_deref(),
            timestamp.as_deref(),
        )
        .await?;
    println!("Created snapshot {} and switched to it", render.snapshot_id);
    Ok(())
}

pub async fn switch_snapshot(root: &Path, view: &str, snapshot: &str) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let render = workspace
        .switch_snapshot(&ViewId::from(view), &SnapshotId::from(snapshot), Capture::Stored)
        .await?;
    println!(
        "Switched to {} ({} nodes, {} edges)",
        render.snapshot_id,
        render.nodes.len(),
        render.edges.len()
    );
    Ok(())
}

pub async fn rename_snapshot(root: &Path, view: &str, snapshot: &str, label: &str) -> anyhow::Result<()> {
    let workspace = open(root)?;
    workspace
        .rename_snapshot(&ViewId::from(view), &SnapshotId::from(snapshot), label)
        .await?;
    println!("Renamed {} to {:?}", snapshot, label.trim());
    Ok(())
}

pub async fn delete_snapshot(root: &Path, view: &str, snapshot: &str) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let current = workspace
        .delete_snapshot(&ViewId::from(view), &SnapshotId::from(snapshot))
        .await?;
    println!("Deleted {}; current snapshot is {}", snapshot, current);
    Ok(())
}

pub async fn reorder_snapshots(root: &Path, view: &str, order: Vec<String>) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let order = order.into_iter().map(SnapshotId::from).collect();
    workspace.reorder_snapshots(&ViewId::from(view), order).await?;
    println!("Reordered timeline of {}", view);
    Ok(())
}

pub async fn diff(root: &Path, view: &str, from: &str, to: Option<String>) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let to = to.map(SnapshotId::from);
    let diff = workspace
        .diff_snapshots(&ViewId::from(view), &SnapshotId::from(from), to.as_ref())
        .await?;
    if diff.summary.is_empty() {
        println!("No changes between {} and {}", diff.from, diff.to);
    }
    for line in &diff.summary {
        println!("{}", line);
    }
    Ok(())
}

pub async fn validate(root: &Path, view: Option<String>) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let view = view.map(ViewId::from);
    let report = workspace.validate(view.as_ref()).await?;
    let summary = ValidationSummary::from(&report);
    for warning in &summary.warnings {
        println!("warning: {}", warning);
    }
    for error in &summary.errors {
        println!("error: {}", error);
    }
    if !summary.ok {
        anyhow::bail!("validation found {} error(s)", summary.errors.len());
    }
    println!("OK");
    Ok(())
}

pub async fn add_node(
    root: &Path,
    view: &str,
    label: &str,
    kind: &str,
    technology: Option<String>,
    x: f64,
    y: f64,
) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let kind: NodeKind = parse_tag(kind)?;
    let draft = NodeDraft {
        kind,
        label: label.to_string(),
        technology,
        x,
        y,
    };
    let id = workspace.add_node(&ViewId::from(view), draft, &TerminalUi).await?;
    println!("Placed node {} on {}", id, view);
    Ok(())
}

pub async fn delete_node(root: &Path, node: &str, yes: bool) -> anyhow::Result<()> {
    let workspace = open(root)?;
    let node = NodeId::from(node);
    let deletion = if yes {
        let ui = StaticUi::new(true, CollisionChoice::Cancel);
        workspace.delete_node_globally(&node, &ui).await?
    } else {
        workspace.delete_node_globally(&node, &TerminalUi).await?
    };
    println!(
        "Deleted {}: {} edge(s), {} view(s), {} snapshot(s) touched",
        deletion.node,
        deletion.edges_removed.len(),
        deletion.views_touched.len(),
        deletion.snapshots_touched
    );
    Ok(())
}

pub async fn serve(root: &Path, host: String, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting Strata server on {}:{}", host, port);

    let workspace = open(root)?;
    workspace.init(None).await?;
    let views = workspace.list_views().await?;
    tracing::info!("Serving {} view(s) from {}", views.len(), root.display());

    let server = StrataServer::new(Arc::new(workspace), ServerConfig { host, port });
    server.start().await
}

/// Prompts on stdin/stderr.
struct TerminalUi;

impl TerminalUi {
    async fn ask(prompt: String) -> String {
        tokio::task::spawn_blocking(move || {
            eprint!("{} ", prompt);
            let _ = io::stderr().flush();
            let mut answer = String::new();
            match io::stdin().lock().read_line(&mut answer) {
                Ok(_) => answer.trim().to_lowercase(),
                Err(_) => String::new(),
            }
        })
        .await
        .unwrap_or_default()
    }
}

#[async_trait]
impl UiPort for TerminalUi {
    async fn confirm(&self, question: &str) -> bool {
        let answer = Self::ask(format!("{} [y/N]", question)).await;
        matches!(answer.as_str(), "y" | "yes")
    }

    async fn choose_one(&self, question: &str, options: &[CollisionChoice]) -> CollisionChoice {
        let keys: Vec<&str> = options
            .iter()
            .map(|choice| match choice {
                CollisionChoice::ReuseExisting => "[r]euse",
                CollisionChoice::CreateNew => "[n]ew",
                CollisionChoice::Cancel => "[c]ancel",
            })
            .collect();
        let answer = Self::ask(format!("{} {}", question, keys.join(" / "))).await;
        let picked = match answer.as_str() {
            "r" | "reuse" => CollisionChoice::ReuseExisting,
            "n" | "new" => CollisionChoice::CreateNew,
            _ => CollisionChoice::Cancel,
        };
        if options.contains(&picked) {
            picked
        } else {
            CollisionChoice::Cancel
        }
    }
}
