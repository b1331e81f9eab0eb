//! Workflows spanning the entity pool and the view files
//!
//! All mutations go through one writer lock, so a debounced canvas save,
//! a snapshot switch and a global delete never interleave. Whenever both
//! files change, the entity pool is written before the view, so a view on
//! disk never lays out a node the pool does not know.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use strata_core::{
    ChangeSet, DiagramType, EdgeId, GraphState, MAX_SNAPSHOTS, Layout, Node, NodeId, NodeKind,
    RelationGraph, RenderGraph, SnapshotContent, SnapshotId,
    SnapshotSummary, TimelineError, ValidationReport, View, ViewId, dehydrate, diff, hydrate,
    summarize, validate_view,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::entity_store::EntityStore;
use crate::error::{Result, StoreError};
use crate::port::{CollisionChoice, FilePort, LocalFiles, UiPort};
use crate::view_store::{ViewStore, check_view_id};

/// Where the outgoing snapshot's content comes from when the current
/// snapshot is about to change.
#[derive(Debug, Clone, Copy)]
pub enum Capture<'a> {
    /// The canvas as it is on screen, possibly with unsaved edits.
    Canvas(&'a RenderGraph),
    /// Nothing is in flight; the stored snapshot is already up to date.
    Stored,
}

/// Result of folding a canvas into storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub view_id: ViewId,
    pub snapshot_id: SnapshotId,
    pub created_nodes: Vec<NodeId>,
    pub pool_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDiff {
    pub from: SnapshotId,
    pub to: SnapshotId,
    pub changes: ChangeSet,
    pub summary: Vec<String>,
}

/// A node to place on a view's current snapshot.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub kind: NodeKind,
    pub label: String,
    pub technology: Option<String>,
    pub x: f64,
    pub y: f64,
}

/// What a global delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeletion {
    pub node: NodeId,
    pub edges_removed: Vec<EdgeId>,
    pub views_touched: Vec<ViewId>,
    pub snapshots_touched: usize,
}

pub struct Workspace {
    config: StoreConfig,
    entities: EntityStore,
    views: ViewStore,
    writer: Mutex<()>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("entities", &self.entities)
            .field("views", &self.views)
            .finish()
    }
}

impl Workspace {
    pub fn new(files: Arc<dyn FilePort>, config: StoreConfig) -> Self {
        let ttl = config.cache_ttl();
        Self {
            entities: EntityStore::new(files.clone(), config.entity_file.clone(), ttl),
            views: ViewStore::new(files, config.views_dir.clone(), ttl),
            config,
            writer: Mutex::new(()),
        }
    }

    /// Workspace rooted at a directory on disk, configured from its
    /// `strata.toml` and environment.
    pub fn open(root: &Path) -> Result<Self> {
        let config = StoreConfig::load(root)?;
        debug!("Opening workspace at {} with {:?}", root.display(), config);
        Ok(Self::new(Arc::new(LocalFiles::new(root)), config))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn views(&self) -> &ViewStore {
        &self.views
    }

    /// Create an empty entity pool unless one exists. Returns whether a
    /// pool was created.
    pub async fn init(&self, title: Option<&str>) -> Result<bool> {
        let _guard = self.writer.lock().await;
        if self.entities.exists().await? {
            return Ok(false);
        }
        let title = title.unwrap_or(&self.config.title);
        self.entities.write(GraphState::new(title)).await?;
        info!("Initialized entity pool {:?}", title);
        Ok(true)
    }

    pub async fn create_view(&self, id: &str, title: &str, diagram_type: DiagramType) -> Result<View> {
        let id = check_view_id(id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(TimelineError::EmptyInput { field: "title" }.into());
        }

        let _guard = self.writer.lock().await;
        if self.views.exists(&id).await? {
            return Err(StoreError::AlreadyExists {
                what: "view",
                id: id.to_string(),
            });
        }
        let mut view = View::new(id, title, diagram_type);
        self.views.write(&mut view).await?;
        info!("Created view {} ({:?})", view.id, diagram_type);
        Ok(view)
    }

    pub async fn list_views(&self) -> Result<Vec<ViewId>> {
        self.views.list().await
    }

    /// Render graph of the view's current snapshot.
    pub async fn render(&self, view: &ViewId) -> Result<RenderGraph> {
        let entities = self.entities.read().await?;
        let view = self.views.read(view).await?;
        let snapshot = view.timeline.current()?;
        Ok(hydrate(&entities, &view, snapshot))
    }

    /// Fold an edited canvas into the pool and its snapshot.
    ///
    /// Fails with `StaleSnapshot` when the canvas was hydrated from a
    /// snapshot that is no longer current.
    pub async fn save_canvas(&self, canvas: &RenderGraph) -> Result<SaveOutcome> {
        let _guard = self.writer.lock().await;
        let mut view = self.views.read(&canvas.view_id).await?;
        let outcome = self.flush_canvas(&mut view, canvas).await?;
        self.views.write(&mut view).await?;
        Ok(outcome)
    }

    /// Copy the current snapshot into a new one, which becomes current.
    pub async fn create_snapshot(
        &self,
        view: &ViewId,
        capture: Capture<'_>,
        label: &str,
        description: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<RenderGraph> {
        if label.trim().is_empty() {
            return Err(TimelineError::EmptyInput { field: "label" }.into());
        }

        let _guard = self.writer.lock().await;
        let mut view = self.views.read(view).await?;
        if view.timeline.is_full() {
            return Err(TimelineError::LimitExceeded {
                limit: MAX_SNAPSHOTS,
            }
            .into());
        }
        if let Capture::Canvas(canvas) = capture {
            self.flush_canvas(&mut view, canvas).await?;
        }

        let created = view
            .timeline
            .create_snapshot(label, description, timestamp)?
            .clone();
        view.mirror(&created);
        self.views.write(&mut view).await?;
        info!("Created snapshot {:?} ({}) in view {}", created.label, created.id, view.id);

        let entities = self.entities.read().await?;
        Ok(hydrate(&entities, &view, &created))
    }

    /// Move the view to `target`.
    ///
    /// The outgoing snapshot is captured and written to disk before the
    /// pointer moves, and the target is hydrated only after that.
    pub async fn switch_snapshot(
        &self,
        view: &ViewId,
        target: &SnapshotId,
        capture: Capture<'_>,
    ) -> Result<RenderGraph> {
        let _guard = self.writer.lock().await;
        let mut view = self.views.read(view).await?;
        if view.timeline.get(target).is_none() {
            return Err(TimelineError::NotFound(target.clone()).into());
        }

        if let Capture::Canvas(canvas) = capture {
            self.flush_canvas(&mut view, canvas).await?;
            self.views.write(&mut view).await?;
        }

        let outgoing = view.timeline.current()?.content();
        let from = view.timeline.current_id().clone();
        view.timeline.switch_snapshot(target, outgoing)?;
        let incoming = view.timeline.current()?.clone();
        view.mirror(&incoming);
        self.views.write(&mut view).await?;
        info!("View {} switched snapshot {} -> {}", view.id, from, target);

        let entities = self.entities.read().await?;
        Ok(hydrate(&entities, &view, &incoming))
    }

    /// Remove a snapshot and return the id that is current afterwards.
    pub async fn delete_snapshot(&self, view: &ViewId, id: &SnapshotId) -> Result<SnapshotId> {
        let _guard = self.writer.lock().await;
        let mut view = self.views.read(view).await?;
        let removed = view.timeline.delete_snapshot(id)?;
        let current = view.timeline.current()?.clone();
        view.mirror(&current);
        self.views.write(&mut view).await?;
        info!("Deleted snapshot {:?} ({}) from view {}", removed.label, removed.id, view.id);
        Ok(current.id)
    }

    pub async fn rename_snapshot(&self, view: &ViewId, id: &SnapshotId, label: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut view = self.views.read(view).await?;
        view.timeline.rename_snapshot(id, label)?;
        self.views.write(&mut view).await
    }

    pub async fn reorder_snapshots(&self, view: &ViewId, order: Vec<SnapshotId>) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut view = self.views.read(view).await?;
        view.timeline.reorder_snapshots(order)?;
        self.views.write(&mut view).await
    }

    pub async fn list_snapshots(&self, view: &ViewId) -> Result<Vec<SnapshotSummary>> {
        Ok(self.views.read(view).await?.timeline.summaries())
    }

    /// Compare two snapshots of one view. `to` defaults to the current one.
    pub async fn diff_snapshots(
        &self,
        view: &ViewId,
        from: &SnapshotId,
        to: Option<&SnapshotId>,
    ) -> Result<SnapshotDiff> {
        let view = self.views.read(view).await?;
        let to = to.unwrap_or(view.timeline.current_id());
        let before = view
            .timeline
            .get(from)
            .ok_or_else(|| TimelineError::NotFound(from.clone()))?;
        let after = view
            .timeline
            .get(to)
            .ok_or_else(|| TimelineError::NotFound(to.clone()))?;

        let entities = self.entities.read().await?;
        let changes = diff(before, after);
        let summary = summarize(&changes, before, after, &entities);
        Ok(SnapshotDiff {
            from: from.clone(),
            to: to.clone(),
            changes,
            summary,
        })
    }

    /// Check one view, or every view, against the pool.
    pub async fn validate(&self, view: Option<&ViewId>) -> Result<ValidationReport> {
        let entities = self.entities.read().await?;
        let ids = match view {
            Some(id) => vec![id.clone()],
            None => self.views.list().await?,
        };

        let mut report = match strata_core::check_pool(&entities) {
            Ok(()) => ValidationReport::default(),
            Err(e) => ValidationReport {
                errors: e.issues,
                warnings: Vec::new(),
            },
        };
        for id in &ids {
            let view = self.views.read(id).await?;
            let view_report = validate_view(&entities, &view);
            for issue in view_report.errors {
                if !report.errors.contains(&issue) {
                    report.errors.push(issue);
                }
            }
            report.warnings.extend(view_report.warnings);
        }

        if !report.is_ok() {
            warn!("Validation found {} error(s)", report.errors.len());
        }
        Ok(report)
    }

    /// Place a node on the current snapshot of `view`, creating the global
    /// node if needed. A label already used in the pool is resolved through
    /// `ui`.
    pub async fn add_node(&self, view: &ViewId, draft: NodeDraft, ui: &dyn UiPort) -> Result<NodeId> {
        let label = draft.label.trim().to_string();
        if label.is_empty() {
            return Err(TimelineError::EmptyInput { field: "label" }.into());
        }

        let _guard = self.writer.lock().await;
        let mut view = self.views.read(view).await?;
        let mut entities = self.entities.read().await?;

        let existing = entities.find_by_label(&label).map(|n| n.id.clone());
        let (id, created) = match existing {
            Some(existing) => {
                let question = format!(
                    "A node labelled {:?} already exists ({}). Reuse it?",
                    label, existing
                );
                match ui.choose_one(&question, &CollisionChoice::ALL).await {
                    CollisionChoice::ReuseExisting => (existing, false),
                    CollisionChoice::CreateNew => (insert_new_node(&mut entities, &draft, &label), true),
                    CollisionChoice::Cancel => {
                        return Err(StoreError::Cancelled(format!("adding {:?}", label)));
                    }
                }
            }
            None => (insert_new_node(&mut entities, &draft, &label), true),
        };

        let mut content = view.timeline.current()?.content();
        if content.layout.contains_key(&id) {
            debug!("Node {} already placed in view {}", id, view.id);
            return Ok(id);
        }
        place(&mut content, &id, &draft);

        if created {
            self.entities.write(entities).await?;
        }
        view.timeline.capture(content)?;
        let current = view.timeline.current()?.clone();
        view.mirror(&current);
        self.views.write(&mut view).await?;
        info!("Added node {} ({:?}) to view {}", id, label, view.id);
        Ok(id)
    }

    /// Remove a node from the pool and from every view and snapshot, after
    /// the user confirms.
    pub async fn delete_node_globally(&self, node: &NodeId, ui: &dyn UiPort) -> Result<NodeDeletion> {
        let _guard = self.writer.lock().await;
        let mut entities = self.entities.read().await?;
        let label = entities
            .node(node)
            .map(|n| n.label.clone())
            .ok_or_else(|| StoreError::not_found("node", node))?;

        let question = format!(
            "Delete {:?} ({}) from every view and snapshot? This cannot be undone.",
            label, node
        );
        if !ui.confirm(&question).await {
            return Err(StoreError::Cancelled(format!("deleting {}", node)));
        }

        let mut deletion = NodeDeletion {
            node: node.clone(),
            ..NodeDeletion::default()
        };

        // Views first: if the pool write then fails, nothing on disk
        // references a node that is gone.
        for id in self.views.list().await? {
            let mut view = self.views.read(&id).await?;
            let mut touched = 0;
            view.timeline.for_each_snapshot_mut(|snapshot| {
                if snapshot.remove_node(node) {
                    touched += 1;
                }
            });
            let listed = view.nodes.len();
            view.nodes.retain(|n| n != node);
            let laid_out = view.layout.remove(node).is_some();
            if touched > 0 || laid_out || listed != view.nodes.len() {
                self.views.write(&mut view).await?;
                deletion.snapshots_touched += touched;
                deletion.views_touched.push(id);
            }
        }

        let (graph, _) = RelationGraph::from_pool(&entities);
        deletion.edges_removed = graph.edges_touching(node);
        for edge in &deletion.edges_removed {
            entities.edges.remove(edge);
        }
        entities.nodes.remove(node);
        self.entities.write(entities).await?;

        info!(
            "Deleted node {} globally: {} edge(s), {} view(s), {} snapshot(s)",
            node,
            deletion.edges_removed.len(),
            deletion.views_touched.len(),
            deletion.snapshots_touched
        );
        Ok(deletion)
    }

    /// Dehydrate `canvas` into the current snapshot of `view` (in memory)
    /// and write the pool if it changed. The caller writes the view.
    async fn flush_canvas(&self, view: &mut View, canvas: &RenderGraph) -> Result<SaveOutcome> {
        view.timeline.ensure_current(&canvas.snapshot_id)?;
        let entities = self.entities.read().await?;
        let dehydrated = dehydrate(canvas, &entities, view, view.timeline.current()?)?;

        let pool_changed =
            dehydrated.entities.nodes != entities.nodes || dehydrated.entities.edges != entities.edges;
        if pool_changed {
            self.entities.write(dehydrated.entities).await?;
        }

        view.timeline.capture(dehydrated.snapshot.content())?;
        view.mirror(&dehydrated.snapshot);
        debug!(
            "Captured canvas into snapshot {} of view {}",
            dehydrated.snapshot.id, view.id
        );

        Ok(SaveOutcome {
            view_id: view.id.clone(),
            snapshot_id: dehydrated.snapshot.id,
            created_nodes: dehydrated.created_nodes,
            pool_changed,
        })
    }
}

fn insert_new_node(entities: &mut GraphState, draft: &NodeDraft, label: &str) -> NodeId {
    let id = NodeId::generate();
    let mut node = Node::new(id.clone(), draft.kind, label);
    node.technology = draft.technology.clone();
    entities.insert_node(node);
    id
}

fn place(content: &mut SnapshotContent, id: &NodeId, draft: &NodeDraft) {
    content.layout.insert(id.clone(), Layout::at(draft.x, draft.y));
}
