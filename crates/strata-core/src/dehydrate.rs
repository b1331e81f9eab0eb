//! Fold an edited render graph back into the pool and its snapshot
//!
//! Global nodes only ever receive invariant fields (technology, team,
//! knowledge, metrics, links). Label, description, status and style are
//! cosmetic and go to the snapshot's `node_properties`, so editing one
//! snapshot never changes how another one looks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{DehydrateError, IntegrityError, IssueScope};
use crate::graph::RelationGraph;
use crate::hydrate::{RenderEdge, RenderGraph, RenderNode};
use crate::model::{
    Edge, EdgeDirection, EdgeStyle, GraphState, Layout, Node, NodeId, NodeOverride,
    OverrideProperties, Snapshot, View,
};

/// Keys that must never survive in an edge's free-form property bag,
/// because they are stored in dedicated fields.
const RESERVED_EDGE_KEYS: [&str; 4] = ["direction", "style", "markerStart", "markerEnd"];

/// Result of a dehydration: new pool and new snapshot, both owned.
#[derive(Debug, Clone)]
pub struct Dehydrated {
    pub entities: GraphState,
    pub snapshot: Snapshot,
    /// Nodes that did not exist in the pool before.
    pub created_nodes: Vec<NodeId>,
}

pub fn dehydrate(
    render: &RenderGraph,
    entities: &GraphState,
    view: &View,
    snapshot: &Snapshot,
) -> Result<Dehydrated, DehydrateError> {
    if render.view_id != view.id {
        return Err(DehydrateError::ViewMismatch {
            expected: view.id.clone(),
            found: render.view_id.clone(),
        });
    }
    if render.snapshot_id != snapshot.id {
        return Err(DehydrateError::SnapshotMismatch {
            expected: snapshot.id.clone(),
            found: render.snapshot_id.clone(),
        });
    }

    let (_, issues) = RelationGraph::build(
        render.nodes.iter().map(|n| &n.id),
        render.edges.iter().map(|e| (&e.id, &e.source, &e.target)),
        IssueScope::Canvas,
    );
    if !issues.is_empty() {
        return Err(IntegrityError { issues }.into());
    }

    let now = Utc::now();
    let mut entities = entities.clone();
    let mut snapshot = snapshot.clone();
    let mut created_nodes = Vec::new();
    let mut layout = BTreeMap::new();
    let mut overrides = BTreeMap::new();

    for rn in &render.nodes {
        match entities.nodes.get_mut(&rn.id) {
            Some(node) => {
                if absorb_invariants(node, rn) {
                    node.updated = now;
                }
            }
            None => {
                entities.insert_node(new_global_node(rn, now));
                created_nodes.push(rn.id.clone());
            }
        }
        if let Some(over) = entities
            .node(&rn.id)
            .and_then(|global| display_override(rn, global))
        {
            overrides.insert(rn.id.clone(), over);
        }
        layout.insert(
            rn.id.clone(),
            Layout {
                x: rn.x,
                y: rn.y,
                width: Some(rn.width),
                height: Some(rn.height),
                locked: rn.locked,
            },
        );
    }

    snapshot.layout = layout;
    snapshot.node_properties = overrides;
    snapshot.edges = render.edges.iter().map(normalize_edge).collect();
    snapshot.groups = render.groups.clone();
    snapshot.annotations = render.annotations.clone();

    for edge in &snapshot.edges {
        // The pool keeps the first version of an edge; later per-snapshot
        // divergence stays in the snapshot.
        entities
            .edges
            .entry(edge.id.clone())
            .or_insert_with(|| edge.clone());
    }

    if !created_nodes.is_empty() {
        info!(
            "Created {} global node(s) from view {}",
            created_nodes.len(),
            view.id
        );
    }
    debug!(
        "Dehydrated snapshot {}: {} nodes, {} edges",
        snapshot.id,
        snapshot.layout.len(),
        snapshot.edges.len()
    );

    Ok(Dehydrated {
        entities,
        snapshot,
        created_nodes,
    })
}

/// Copy invariant fields onto the global node. Returns true on change.
fn absorb_invariants(node: &mut Node, rn: &RenderNode) -> bool {
    let mut changed = false;
    if node.technology != rn.technology {
        node.technology = rn.technology.clone();
        changed = true;
    }
    if node.team != rn.team {
        node.team = rn.team.clone();
        changed = true;
    }
    if node.knowledge != rn.knowledge {
        node.knowledge = rn.knowledge.clone();
        changed = true;
    }
    if node.metrics != rn.metrics {
        node.metrics = rn.metrics.clone();
        changed = true;
    }
    if node.links != rn.links {
        node.links = rn.links.clone();
        changed = true;
    }
    changed
}

/// A first-seen node enters the pool with neutral display values.
fn new_global_node(rn: &RenderNode, now: DateTime<Utc>) -> Node {
    let mut node = Node::new(rn.id.clone(), rn.kind, rn.kind.display_name());
    node.technology = rn.technology.clone();
    node.team = rn.team.clone();
    node.knowledge = rn.knowledge.clone();
    node.metrics = rn.metrics.clone();
    node.links = rn.links.clone();
    node.updated = now;
    node
}

/// Display values that differ from the global node; `None` when the node
/// is shown exactly as the pool describes it. Technology and team are left
/// unset: they were written to the pool and an override would shadow later
/// edits.
fn display_override(rn: &RenderNode, global: &Node) -> Option<NodeOverride> {
    let differs = |shown: &str, base: &str| (shown != base).then(|| shown.to_string());
    let over = NodeOverride {
        properties: OverrideProperties {
            label: differs(&rn.label, &global.label),
            description: differs(&rn.description, &global.description),
            technology: None,
            team: None,
            status: (rn.status != global.status).then_some(rn.status),
        },
        style: rn.style.delta_from(&global.style),
    };
    (over != NodeOverride::default()).then_some(over)
}

/// Store an edge with its direction in exactly one place.
///
/// Precedence: the dedicated `direction` field, then a legacy `direction`
/// in the property bag (top level or inside a `style` object), then the
/// markers.
fn normalize_edge(re: &RenderEdge) -> Edge {
    let mut properties = re.properties.clone();
    let legacy = legacy_direction(&properties);
    for key in RESERVED_EDGE_KEYS {
        properties.remove(key);
    }

    let direction = re
        .direction
        .or(legacy)
        .unwrap_or_else(|| direction_from_markers(re.marker_start.as_deref(), re.marker_end.as_deref()));

    Edge {
        id: re.id.clone(),
        source: re.source.clone(),
        target: re.target.clone(),
        kind: re.kind,
        label: re.label.clone().filter(|l| !l.trim().is_empty()),
        style: EdgeStyle {
            direction,
            line: re.line,
            color: re.color.clone(),
            animated: re.animated,
        },
        properties,
    }
}

fn legacy_direction(properties: &BTreeMap<String, serde_json::Value>) -> Option<EdgeDirection> {
    let parse = |v: &serde_json::Value| serde_json::from_value::<EdgeDirection>(v.clone()).ok();
    properties
        .get("direction")
        .and_then(parse)
        .or_else(|| {
            properties
                .get("style")
                .and_then(|s| s.get("direction"))
                .and_then(parse)
        })
}

fn direction_from_markers(start: Option<&str>, end: Option<&str>) -> EdgeDirection {
    let present = |m: Option<&str>| m.is_some_and(|m| !m.is_empty() && m != "none");
    match (present(start), present(end)) {
        (true, true) => EdgeDirection::Both,
        (false, true) => EdgeDirection::Forward,
        (true, false) => EdgeDirection::Backward,
        (false, false) => EdgeDirection::None,
    }
}
