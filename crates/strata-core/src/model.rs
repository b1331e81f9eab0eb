//! Core data structures for the entity pool, snapshots, and views

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::Timeline;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Fresh random identifier.
            pub fn generate() -> Self {
                $name(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a node in the global entity pool.
    NodeId,
    "node"
);
string_id!(
    /// Identifier of an edge, unique across the pool and every snapshot.
    EdgeId,
    "edge"
);
string_id!(
    /// Identifier of a snapshot within one view's timeline.
    SnapshotId,
    "snapshot"
);
string_id!(
    /// Identifier of a view (one diagram file).
    ViewId,
    "view"
);

/// Discriminates what an architecture node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    // ── C4 levels ───────────────────────────────────────────
    #[default]
    System,
    Person,
    Container,
    Component,

    // ── Infrastructure ──────────────────────────────────────
    Database,
    Queue,

    // ── Business ────────────────────────────────────────────
    Market,

    // ── Code-level ──────────────────────────────────────────
    Code,

    // ── Fallback ────────────────────────────────────────────
    #[serde(other)]
    Unknown,
}

impl NodeKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::System => "System",
            NodeKind::Person => "Person",
            NodeKind::Container => "Container",
            NodeKind::Component => "Component",
            NodeKind::Database => "Database",
            NodeKind::Queue => "Queue",
            NodeKind::Market => "Market",
            NodeKind::Code => "Code",
            NodeKind::Unknown => "Element",
        }
    }
}

/// Lifecycle state shown on a node; cosmetic, so it lives per snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Proposed,
    Planned,
    Active,
    Deprecated,
    Retired,
    #[serde(other)]
    Unknown,
}

/// Presentation attributes of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NodeStyle {
    pub fn is_empty(&self) -> bool {
        self == &NodeStyle::default()
    }

    /// Field-wise merge where every field set on `over` wins. A field set
    /// to the empty string on `over` is cleared.
    pub fn merged_with(&self, over: &NodeStyle) -> NodeStyle {
        NodeStyle {
            color: pick_style(&over.color, &self.color),
            background_color: pick_style(&over.background_color, &self.background_color),
            border_color: pick_style(&over.border_color, &self.border_color),
            shape: pick_style(&over.shape, &self.shape),
            icon: pick_style(&over.icon, &self.icon),
        }
    }

    /// The smallest `over` for which `base.merged_with(over)` equals `self`,
    /// or `None` when nothing differs.
    pub fn delta_from(&self, base: &NodeStyle) -> Option<NodeStyle> {
        let field = |shown: &Option<String>, base: &Option<String>| {
            (shown != base).then(|| shown.clone().unwrap_or_default())
        };
        let over = NodeStyle {
            color: field(&self.color, &base.color),
            background_color: field(&self.background_color, &base.background_color),
            border_color: field(&self.border_color, &base.border_color),
            shape: field(&self.shape, &base.shape),
            icon: field(&self.icon, &base.icon),
        };
        (!over.is_empty()).then_some(over)
    }
}

fn pick_style(over: &Option<String>, base: &Option<String>) -> Option<String> {
    match over {
        Some(value) if value.is_empty() => None,
        Some(value) => Some(value.clone()),
        None => base.clone(),
    }
}

/// A node in the global entity pool.
///
/// `label`, `description`, `status` and `style` here are only the neutral
/// defaults; what a snapshot displays comes from its `node_properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default)]
    pub style: NodeStyle,
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, label: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            kind,
            label: label.into(),
            description: String::new(),
            technology: None,
            team: None,
            knowledge: Vec::new(),
            metrics: BTreeMap::new(),
            links: Vec::new(),
            status: None,
            style: NodeStyle::default(),
            updated: Utc::now(),
        }
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Uses,
    DependsOn,
    Calls,
    ReadsFrom,
    WritesTo,
    Publishes,
    Subscribes,
    Contains,
    #[serde(other)]
    Relates,
}

impl EdgeKind {
    /// Verb phrase used when describing `source <verb> target`.
    pub fn verb(&self) -> &'static str {
        match self {
            EdgeKind::Uses => "uses",
            EdgeKind::DependsOn => "depends on",
            EdgeKind::Calls => "calls",
            EdgeKind::ReadsFrom => "reads from",
            EdgeKind::WritesTo => "writes to",
            EdgeKind::Publishes => "publishes to",
            EdgeKind::Subscribes => "subscribes to",
            EdgeKind::Contains => "contains",
            EdgeKind::Relates => "relates to",
        }
    }
}

/// Which end(s) of an edge carry an arrowhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    #[default]
    Forward,
    Backward,
    Both,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

/// Edge presentation. `direction` is stored here and nowhere else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    #[serde(default)]
    pub direction: EdgeDirection,
    #[serde(default)]
    pub line: LineStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub animated: bool,
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub style: EdgeStyle,
    /// Free-form extra attributes from the canvas.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        kind: EdgeKind,
    ) -> Self {
        Edge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind,
            label: None,
            style: EdgeStyle::default(),
            properties: BTreeMap::new(),
        }
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// Position and size of one node inside one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub locked: bool,
}

impl Layout {
    pub fn at(x: f64, y: f64) -> Self {
        Layout {
            x,
            y,
            ..Layout::default()
        }
    }

    pub fn sized(x: f64, y: f64, width: f64, height: f64) -> Self {
        Layout {
            x,
            y,
            width: Some(width),
            height: Some(height),
            locked: false,
        }
    }
}

/// Per-snapshot display values layered over a global node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// `Some(None)` hides a status the pool sets; it is stored as `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<Option<NodeStatus>>,
}

/// A field that is present becomes `Some`, even when it is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOverride {
    #[serde(default)]
    pub properties: OverrideProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<NodeStyle>,
}

/// Free text placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A visual grouping of nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A named point-in-time capture of one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: SnapshotId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    /// Which nodes exist in this snapshot, and where.
    #[serde(default)]
    pub layout: BTreeMap<NodeId, Layout>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_properties: BTreeMap<NodeId, NodeOverride>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Snapshot {
    pub fn new(label: impl Into<String>) -> Self {
        Snapshot {
            id: SnapshotId::generate(),
            label: label.into(),
            description: String::new(),
            timestamp: None,
            created: Utc::now(),
            layout: BTreeMap::new(),
            edges: Vec::new(),
            node_properties: BTreeMap::new(),
            groups: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.layout.contains_key(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    /// Owned copy of the editable content.
    pub fn content(&self) -> SnapshotContent {
        SnapshotContent {
            layout: self.layout.clone(),
            edges: self.edges.clone(),
            node_properties: self.node_properties.clone(),
            groups: self.groups.clone(),
            annotations: self.annotations.clone(),
        }
    }

    /// Overwrite the editable content, keeping identity and metadata.
    pub fn apply(&mut self, content: SnapshotContent) {
        self.layout = content.layout;
        self.edges = content.edges;
        self.node_properties = content.node_properties;
        self.groups = content.groups;
        self.annotations = content.annotations;
    }

    /// Drop every trace of `node`. Returns true if anything was removed.
    pub fn remove_node(&mut self, node: &NodeId) -> bool {
        let mut removed = self.layout.remove(node).is_some();
        removed |= self.node_properties.remove(node).is_some();
        let edges_before = self.edges.len();
        self.edges.retain(|e| !e.touches(node));
        removed |= self.edges.len() != edges_before;
        for group in &mut self.groups {
            let before = group.nodes.len();
            group.nodes.retain(|n| n != node);
            removed |= group.nodes.len() != before;
        }
        removed
    }
}

/// The editable body of a snapshot, detached from its identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotContent {
    pub layout: BTreeMap<NodeId, Layout>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub node_properties: BTreeMap<NodeId, NodeOverride>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Header of the entity pool file. Counts are derived, never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub title: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub node_count: usize,
    #[serde(default)]
    pub edge_count: usize,
}

/// The global pool of nodes and edges shared by every view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub metadata: EntityMetadata,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    pub edges: BTreeMap<EdgeId, Edge>,
}

impl GraphState {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        GraphState {
            metadata: EntityMetadata {
                title: title.into(),
                created: now,
                updated: now,
                node_count: 0,
                edge_count: 0,
            },
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// First node whose label matches, ignoring case and surrounding whitespace.
    pub fn find_by_label(&self, label: &str) -> Option<&Node> {
        let wanted = label.trim();
        self.nodes
            .values()
            .find(|n| n.label.trim().eq_ignore_ascii_case(wanted))
    }

    /// Recompute the derived header fields.
    pub fn refresh_metadata(&mut self, now: DateTime<Utc>) {
        self.metadata.node_count = self.nodes.len();
        self.metadata.edge_count = self.edges.len();
        self.metadata.updated = now;
    }
}

/// Kind of diagram a view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    #[default]
    Context,
    Container,
    Component,
    Deployment,
    Landscape,
    #[serde(other)]
    Freeform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMetadata {
    pub title: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub diagram_type: DiagramType,
}

/// One diagram: a selection from the pool plus its own timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Derived from the file name, not stored in the document.
    #[serde(skip)]
    pub id: ViewId,
    pub metadata: ViewMetadata,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    /// Mirror of the current snapshot's layout.
    #[serde(default)]
    pub layout: BTreeMap<NodeId, Layout>,
    pub timeline: Timeline,
}

impl View {
    pub fn new(id: impl Into<ViewId>, title: impl Into<String>, diagram_type: DiagramType) -> Self {
        let now = Utc::now();
        View {
            id: id.into(),
            metadata: ViewMetadata {
                title: title.into(),
                created: now,
                updated: now,
                diagram_type,
            },
            nodes: Vec::new(),
            layout: BTreeMap::new(),
            timeline: Timeline::new(Snapshot::new("Current")),
        }
    }

    /// Bring `nodes` and the live layout in line with `snapshot`,
    /// keeping the existing order of nodes that survive.
    pub fn mirror(&mut self, snapshot: &Snapshot) {
        self.nodes.retain(|id| snapshot.layout.contains_key(id));
        for id in snapshot.layout.keys() {
            if !self.nodes.contains(id) {
                self.nodes.push(id.clone());
            }
        }
        self.layout = snapshot.layout.clone();
    }
}
