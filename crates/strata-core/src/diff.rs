//! Change detection between two snapshots

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeId, GraphState, NodeId, NodeStyle, Snapshot};

/// Classified differences between a `before` and an `after` snapshot.
/// All lists are sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub added_nodes: Vec<NodeId>,
    pub modified_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub added_edges: Vec<EdgeId>,
    pub removed_edges: Vec<EdgeId>,
    pub unchanged_nodes: Vec<NodeId>,
    pub unchanged_edges: Vec<EdgeId>,
}

impl ChangeSet {
    /// Sum of added, modified and removed nodes and edges.
    pub fn count_changes(&self) -> usize {
        self.added_nodes.len()
            + self.modified_nodes.len()
            + self.removed_nodes.len()
            + self.added_edges.len()
            + self.removed_edges.len()
    }

    pub fn has_changes(&self) -> bool {
        self.count_changes() > 0
    }
}

/// The fields whose change makes a node "modified". Position is
/// deliberately not among them.
#[derive(Debug, PartialEq, Eq)]
struct Facets<'a> {
    label: Option<&'a str>,
    description: Option<&'a str>,
    technology: Option<&'a str>,
    team: Option<&'a str>,
    style: Option<&'a NodeStyle>,
}

fn facets<'a>(snapshot: &'a Snapshot, id: &NodeId) -> Facets<'a> {
    let over = snapshot.node_properties.get(id);
    let props = over.map(|o| &o.properties);
    Facets {
        label: props.and_then(|p| p.label.as_deref()),
        description: props.and_then(|p| p.description.as_deref()),
        technology: props.and_then(|p| p.technology.as_deref()),
        team: props.and_then(|p| p.team.as_deref()),
        style: over
            .and_then(|o| o.style.as_ref())
            .filter(|s| !s.is_empty()),
    }
}

/// Compare two snapshots.
///
/// Nodes are matched by presence in the layout and compared on label,
/// description, technology, team and style. Edges are matched by id only.
pub fn diff(before: &Snapshot, after: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for id in after.layout.keys() {
        if !before.layout.contains_key(id) {
            changes.added_nodes.push(id.clone());
        } else if facets(before, id) != facets(after, id) {
            changes.modified_nodes.push(id.clone());
        } else {
            changes.unchanged_nodes.push(id.clone());
        }
    }
    for id in before.layout.keys() {
        if !after.layout.contains_key(id) {
            changes.removed_nodes.push(id.clone());
        }
    }

    let before_edges: BTreeSet<&EdgeId> = before.edges.iter().map(|e| &e.id).collect();
    let after_edges: BTreeSet<&EdgeId> = after.edges.iter().map(|e| &e.id).collect();
    for id in &after_edges {
        if before_edges.contains(id) {
            changes.unchanged_edges.push((*id).clone());
        } else {
            changes.added_edges.push((*id).clone());
        }
    }
    for id in before_edges.difference(&after_edges) {
        changes.removed_edges.push((*id).clone());
    }

    changes
}

/// Render a change set as one line per change, e.g.
/// `+ edge System A uses System B`.
pub fn summarize(
    changes: &ChangeSet,
    before: &Snapshot,
    after: &Snapshot,
    entities: &GraphState,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(changes.count_changes());

    for id in &changes.added_nodes {
        lines.push(format!("+ node {}", node_label(after, entities, id)));
    }
    for id in &changes.modified_nodes {
        lines.push(format!("~ node {}", node_label(after, entities, id)));
    }
    for id in &changes.removed_nodes {
        lines.push(format!("- node {}", node_label(before, entities, id)));
    }
    for id in &changes.added_edges {
        if let Some(edge) = after.edge(id) {
            lines.push(format!(
                "+ edge {} {} {}",
                node_label(after, entities, &edge.source),
                edge.label.as_deref().unwrap_or(edge.kind.verb()),
                node_label(after, entities, &edge.target)
            ));
        }
    }
    for id in &changes.removed_edges {
        if let Some(edge) = before.edge(id) {
            lines.push(format!(
                "- edge {} {} {}",
                node_label(before, entities, &edge.source),
                edge.label.as_deref().unwrap_or(edge.kind.verb()),
                node_label(before, entities, &edge.target)
            ));
        }
    }

    lines
}

/// Snapshot override label, then pool label, then the raw id.
fn node_label(snapshot: &Snapshot, entities: &GraphState, id: &NodeId) -> String {
    snapshot
        .node_properties
        .get(id)
        .and_then(|o| o.properties.label.clone())
        .or_else(|| {
            entities
                .node(id)
                .map(|n| n.label.clone())
                .filter(|l| !l.is_empty())
        })
        .unwrap_or_else(|| id.to_string())
}
