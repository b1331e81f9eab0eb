//! Materialize a renderable graph from the pool, a view, and one snapshot

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{
    Annotation, DiagramType, Edge, EdgeDirection, EdgeId, EdgeKind, GraphState, Group, Layout,
    LineStyle, Node, NodeId, NodeKind, NodeOverride, NodeStatus, NodeStyle, Snapshot, SnapshotId,
    View, ViewId,
};

/// Fallback size for nodes laid out without one.
pub const DEFAULT_NODE_WIDTH: f64 = 200.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 100.0;

/// Marker name the canvas uses for an arrowhead.
pub const ARROW_MARKER: &str = "arrow";

/// A positioned, styled node as the canvas sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: NodeId,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub status: Option<NodeStatus>,
    #[serde(default)]
    pub style: NodeStyle,
    #[serde(default)]
    pub knowledge: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,
    #[serde(default)]
    pub links: Vec<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default)]
    pub locked: bool,
}

impl RenderNode {
    /// A bare node at a position, as a canvas would create it.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, label: impl Into<String>, x: f64, y: f64) -> Self {
        RenderNode {
            id: id.into(),
            kind,
            label: label.into(),
            description: String::new(),
            technology: None,
            team: None,
            status: None,
            style: NodeStyle::default(),
            knowledge: Vec::new(),
            metrics: BTreeMap::new(),
            links: Vec::new(),
            x,
            y,
            width: DEFAULT_NODE_WIDTH,
            height: DEFAULT_NODE_HEIGHT,
            locked: false,
        }
    }
}

fn default_width() -> f64 {
    DEFAULT_NODE_WIDTH
}

fn default_height() -> f64 {
    DEFAULT_NODE_HEIGHT
}

/// An edge as the canvas sees it.
///
/// The canvas may express direction three ways (`direction`, markers, or a
/// `direction` key in `properties`); dehydration folds them into one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub direction: Option<EdgeDirection>,
    #[serde(default)]
    pub line: LineStyle,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub marker_start: Option<String>,
    #[serde(default)]
    pub marker_end: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl RenderEdge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        kind: EdgeKind,
    ) -> Self {
        RenderEdge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind,
            label: None,
            direction: Some(EdgeDirection::Forward),
            line: LineStyle::Solid,
            color: None,
            animated: false,
            marker_start: None,
            marker_end: Some(ARROW_MARKER.to_string()),
            properties: BTreeMap::new(),
        }
    }
}

/// Everything the canvas needs to draw one snapshot of one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderGraph {
    pub view_id: ViewId,
    /// The snapshot this graph was hydrated from; edits are only accepted
    /// back into that snapshot.
    pub snapshot_id: SnapshotId,
    #[serde(default)]
    pub diagram_type: DiagramType,
    #[serde(default)]
    pub nodes: Vec<RenderNode>,
    #[serde(default)]
    pub edges: Vec<RenderEdge>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl RenderGraph {
    pub fn node(&self, id: &NodeId) -> Option<&RenderNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut RenderNode> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&RenderEdge> {
        self.edges.iter().find(|e| &e.id == id)
    }
}

/// Build the render graph for `snapshot` of `view`.
///
/// The snapshot's layout decides which nodes appear. Nodes missing from
/// the pool and edges whose endpoints were not rendered are skipped with a
/// warning instead of failing the whole view.
pub fn hydrate(entities: &GraphState, view: &View, snapshot: &Snapshot) -> RenderGraph {
    let mut nodes = Vec::with_capacity(snapshot.layout.len());
    for (id, layout) in &snapshot.layout {
        let Some(node) = entities.node(id) else {
            warn!(
                "Skipping node {} in snapshot {}: not in the entity pool",
                id, snapshot.id
            );
            continue;
        };
        nodes.push(render_node(node, layout, snapshot.node_properties.get(id)));
    }

    let rendered: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
    let mut edges = Vec::with_capacity(snapshot.edges.len());
    for edge in &snapshot.edges {
        if !rendered.contains(&edge.source) || !rendered.contains(&edge.target) {
            warn!(
                "Skipping edge {} in snapshot {}: endpoint not rendered",
                edge.id, snapshot.id
            );
            continue;
        }
        edges.push(render_edge(edge));
    }

    debug!(
        "Hydrated view {} snapshot {}: {} nodes, {} edges",
        view.id,
        snapshot.id,
        nodes.len(),
        edges.len()
    );

    RenderGraph {
        view_id: view.id.clone(),
        snapshot_id: snapshot.id.clone(),
        diagram_type: view.metadata.diagram_type,
        nodes,
        edges,
        groups: snapshot.groups.clone(),
        annotations: snapshot.annotations.clone(),
    }
}

fn render_node(node: &Node, layout: &Layout, over: Option<&NodeOverride>) -> RenderNode {
    let props = over.map(|o| &o.properties);
    let pick = |field: Option<&String>, global: &str| -> String {
        field.cloned().unwrap_or_else(|| global.to_string())
    };

    let style = match over.and_then(|o| o.style.as_ref()) {
        Some(style) => node.style.merged_with(style),
        None => node.style.clone(),
    };

    RenderNode {
        id: node.id.clone(),
        kind: node.kind,
        label: pick(props.and_then(|p| p.label.as_ref()), &node.label),
        description: pick(props.and_then(|p| p.description.as_ref()), &node.description),
        technology: props
            .and_then(|p| p.technology.clone())
            .or_else(|| node.technology.clone()),
        team: props
            .and_then(|p| p.team.clone())
            .or_else(|| node.team.clone()),
        status: props.and_then(|p| p.status).unwrap_or(node.status),
        style,
        knowledge: node.knowledge.clone(),
        metrics: node.metrics.clone(),
        links: node.links.clone(),
        x: layout.x,
        y: layout.y,
        width: layout.width.unwrap_or(DEFAULT_NODE_WIDTH),
        height: layout.height.unwrap_or(DEFAULT_NODE_HEIGHT),
        locked: layout.locked,
    }
}

fn render_edge(edge: &Edge) -> RenderEdge {
    let arrow = || Some(ARROW_MARKER.to_string());
    let (marker_start, marker_end) = match edge.style.direction {
        EdgeDirection::Forward => (None, arrow()),
        EdgeDirection::Backward => (arrow(), None),
        EdgeDirection::Both => (arrow(), arrow()),
        EdgeDirection::None => (None, None),
    };

    RenderEdge {
        id: edge.id.clone(),
        source: edge.source.clone(),
        target: edge.target.clone(),
        kind: edge.kind,
        label: edge.label.clone(),
        direction: Some(edge.style.direction),
        line: edge.style.line,
        color: edge.style.color.clone(),
        animated: edge.style.animated,
        marker_start,
        marker_end,
        properties: edge.properties.clone(),
    }
}
