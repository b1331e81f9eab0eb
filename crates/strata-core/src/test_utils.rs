//! Test fixtures for Strata Core

use crate::model::*;

/// Pool with three systems: "System A", "System B" and "Legacy".
pub fn sample_pool() -> GraphState {
    let mut pool = GraphState::new("Test Landscape");
    let mut a = Node::new("a", NodeKind::System, "System A");
    a.technology = Some("Rust".to_string());
    pool.insert_node(a);
    pool.insert_node(Node::new("b", NodeKind::System, "System B"));
    pool.insert_node(Node::new("legacy", NodeKind::System, "Legacy"));
    pool.edges.insert(
        EdgeId::from("a-b"),
        Edge::new("a-b", "a", "b", EdgeKind::Uses),
    );
    pool.refresh_metadata(chrono::Utc::now());
    pool
}

/// Snapshot laying out `nodes` as `(id, x, y)`, each labelled through an
/// override, with no edges.
pub fn snapshot_with(label: &str, nodes: &[(&str, f64, f64)]) -> Snapshot {
    let mut snapshot = Snapshot::new(label);
    for (id, x, y) in nodes {
        snapshot
            .layout
            .insert(NodeId::from(*id), Layout::sized(*x, *y, 200.0, 100.0));
        snapshot.node_properties.insert(
            NodeId::from(*id),
            NodeOverride {
                properties: OverrideProperties {
                    label: Some(format!("Node {}", id)),
                    ..OverrideProperties::default()
                },
                style: None,
            },
        );
    }
    snapshot
}

/// View whose only snapshot shows A and B joined by `a-b`.
pub fn sample_view() -> View {
    let mut view = View::new("context", "Context", DiagramType::Context);
    let mut content = SnapshotContent::default();
    content.layout.insert(NodeId::from("a"), Layout::sized(100.0, 100.0, 200.0, 100.0));
    content.layout.insert(NodeId::from("b"), Layout::at(400.0, 100.0));
    content.edges.push(Edge::new("a-b", "a", "b", EdgeKind::Uses));
    view.timeline
        .capture(content)
        .expect("fresh timeline has a current snapshot");
    let current = view.timeline.current().expect("current").clone();
    view.mirror(&current);
    view
}

/// Set the style colour of `id` in `snapshot`.
pub fn set_color(snapshot: &mut Snapshot, id: &str, color: &str) {
    let entry = snapshot.node_properties.entry(NodeId::from(id)).or_default();
    entry.style = Some(NodeStyle {
        color: Some(color.to_string()),
        ..NodeStyle::default()
    });
}
