//! Connectivity view over a node set and edge list using petgraph::StableDiGraph

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::error::{IntegrityIssue, IssueScope};
use crate::model::{Edge, EdgeId, GraphState, NodeId, Snapshot};

/// A directed multigraph keyed by string ids.
///
/// Building one is also the referential-integrity check: edges whose
/// endpoints are not among the nodes are reported and left out.
pub struct RelationGraph {
    inner: StableDiGraph<NodeId, EdgeId>,
    index: HashMap<NodeId, NodeIndex>,
}

impl std::fmt::Debug for RelationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl RelationGraph {
    /// Build from raw parts, collecting every integrity issue found.
    pub fn build<'a>(
        nodes: impl IntoIterator<Item = &'a NodeId>,
        edges: impl IntoIterator<Item = (&'a EdgeId, &'a NodeId, &'a NodeId)>,
        scope: IssueScope,
    ) -> (Self, Vec<IntegrityIssue>) {
        let mut graph = RelationGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
        };
        let mut issues = Vec::new();

        for id in nodes {
            if graph.index.contains_key(id) {
                issues.push(IntegrityIssue::DuplicateNode {
                    node: id.clone(),
                    scope: scope.clone(),
                });
                continue;
            }
            let idx = graph.inner.add_node(id.clone());
            graph.index.insert(id.clone(), idx);
        }

        let mut seen_edges = HashSet::new();
        for (edge, source, target) in edges {
            if !seen_edges.insert(edge.clone()) {
                issues.push(IntegrityIssue::DuplicateEdge {
                    edge: edge.clone(),
                    scope: scope.clone(),
                });
                continue;
            }
            let mut endpoints = Vec::with_capacity(2);
            for node in [source, target] {
                match graph.index.get(node) {
                    Some(idx) => endpoints.push(*idx),
                    None => issues.push(IntegrityIssue::DanglingEdge {
                        edge: edge.clone(),
                        node: node.clone(),
                        scope: scope.clone(),
                    }),
                }
            }
            if let [s, t] = endpoints.as_slice() {
                graph.inner.add_edge(*s, *t, edge.clone());
            }
        }

        (graph, issues)
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> (Self, Vec<IntegrityIssue>) {
        Self::build(
            snapshot.layout.keys(),
            snapshot.edges.iter().map(edge_parts),
            IssueScope::Snapshot(snapshot.id.clone()),
        )
    }

    pub fn from_pool(state: &GraphState) -> (Self, Vec<IntegrityIssue>) {
        Self::build(
            state.nodes.keys(),
            state.edges.values().map(edge_parts),
            IssueScope::Pool,
        )
    }

    /// Ids of every edge entering or leaving `node`.
    pub fn edges_touching(&self, node: &NodeId) -> Vec<EdgeId> {
        let Some(&idx) = self.index.get(node) else {
            return Vec::new();
        };
        let mut ids: Vec<EdgeId> = [Direction::Outgoing, Direction::Incoming]
            .into_iter()
            .flat_map(|dir| self.inner.edges_directed(idx, dir))
            .map(|e| e.weight().clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

fn edge_parts(edge: &Edge) -> (&EdgeId, &NodeId, &NodeId) {
    (&edge.id, &edge.source, &edge.target)
}
