//! Error types for timeline and graph consistency

use std::fmt;

use thiserror::Error;

use crate::model::{EdgeId, NodeId, SnapshotId, ViewId};

/// Expected failures of timeline operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("snapshot not found: {0}")]
    NotFound(SnapshotId),

    #[error("snapshot limit reached ({limit})")]
    LimitExceeded { limit: usize },

    #[error("cannot delete the only remaining snapshot")]
    LastItemProtected,

    #[error("{field} must not be empty")]
    EmptyInput { field: &'static str },

    #[error("order does not match the existing snapshots (expected {expected} ids, got {found})")]
    OrderMismatch { expected: usize, found: usize },

    /// A canvas hydrated from one snapshot was offered while another is current.
    #[error("canvas belongs to snapshot {canvas} but {current} is current")]
    StaleSnapshot {
        canvas: SnapshotId,
        current: SnapshotId,
    },

    #[error("timeline has no snapshots")]
    Empty,
}

/// Where an integrity issue was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueScope {
    /// The global entity pool.
    Pool,
    Snapshot(SnapshotId),
    /// A render graph coming back from the canvas.
    Canvas,
}

impl fmt::Display for IssueScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueScope::Pool => f.write_str("entity pool"),
            IssueScope::Snapshot(id) => write!(f, "snapshot {}", id),
            IssueScope::Canvas => f.write_str("canvas"),
        }
    }
}

/// One broken cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityIssue {
    #[error("{scope}: edge {edge} references missing node {node}")]
    DanglingEdge {
        edge: EdgeId,
        node: NodeId,
        scope: IssueScope,
    },

    #[error("{scope}: edge id {edge} appears more than once")]
    DuplicateEdge { edge: EdgeId, scope: IssueScope },

    #[error("{scope}: node id {node} appears more than once")]
    DuplicateNode { node: NodeId, scope: IssueScope },

    #[error("{scope}: node {node} is laid out but missing from the entity pool")]
    MissingEntity { node: NodeId, scope: IssueScope },

    #[error("{scope}: override for node {node} has no layout entry")]
    OrphanOverride { node: NodeId, scope: IssueScope },
}

/// Referential integrity would be broken by a write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("referential integrity violated ({} issue(s))", .issues.len())]
pub struct IntegrityError {
    pub issues: Vec<IntegrityIssue>,
}

/// Failure to fold a canvas back into storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DehydrateError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("canvas for view {found} applied to view {expected}")]
    ViewMismatch { expected: ViewId, found: ViewId },

    #[error("canvas for snapshot {found} applied to snapshot {expected}")]
    SnapshotMismatch {
        expected: SnapshotId,
        found: SnapshotId,
    },
}
