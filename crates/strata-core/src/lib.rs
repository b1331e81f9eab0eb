//! Strata Core: entity pool, snapshot timeline, hydration and change detection

pub mod model;
pub mod error;
pub mod timeline;
pub mod graph;
pub mod hydrate;
pub mod dehydrate;
pub mod diff;
pub mod validate;


#[cfg(test)]
pub mod test_utils;

pub use model::{
    Annotation, DiagramType, Edge, EdgeDirection, EdgeId, EdgeKind, EdgeStyle, GraphState, Group,
    Layout, LineStyle, Node, NodeId, NodeKind, NodeOverride, NodeStatus, NodeStyle,
    OverrideProperties, Snapshot, SnapshotContent, SnapshotId, View, ViewId,
};
pub use error::{DehydrateError, IntegrityError, IntegrityIssue, IssueScope, TimelineError};
pub use timeline::{MAX_SNAPSHOTS, SnapshotSummary, Timeline};
pub use graph::RelationGraph;
pub use hydrate::{RenderEdge, RenderGraph, RenderNode, hydrate};
pub use dehydrate::{Dehydrated, dehydrate};
pub use diff::{ChangeSet, diff, summarize};
pub use validate::{ValidationReport, ValidationSummary, check_pool, validate_view};
