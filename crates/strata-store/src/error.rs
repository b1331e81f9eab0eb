//! Storage error type

use strata_core::{DehydrateError, IntegrityError, TimelineError, ViewId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("{what} already exists: {id}")]
    AlreadyExists { what: &'static str, id: String },

    #[error("unsupported {kind} file version {found:?} (this build reads {expected:?})")]
    VersionMismatch {
        kind: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Dehydrate(#[from] DehydrateError),

    #[error("view {view} has an unusable timeline: {source}")]
    InvalidTimeline {
        view: ViewId,
        #[source]
        source: TimelineError,
    },

    #[error("invalid name {0:?}: use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Expected, user-facing failures as opposed to I/O or decoding trouble.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            StoreError::Io(_) | StoreError::Json(_) | StoreError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
