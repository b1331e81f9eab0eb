//! Strata Store: durable entity pool and view files, plus the workflows
//! that keep them consistent (save, snapshot switch, global delete)

pub mod error;
pub mod port;
pub mod atomic;
pub mod format;
pub mod config;
pub mod entity_store;
pub mod view_store;
pub mod workspace;


#[cfg(test)]
pub mod test_utils;

pub use error::{Result, StoreError};
pub use port::{CollisionChoice, FilePort, LocalFiles, MemoryFiles, StaticUi, UiPort};
pub use atomic::write_atomic;
pub use format::{ENTITY_FORMAT_VERSION, VIEW_FORMAT_VERSION};
pub use config::{CONFIG_FILE, StoreConfig};
pub use entity_store::EntityStore;
pub use view_store::ViewStore;
pub use workspace::{
    Capture, NodeDeletion, NodeDraft, SaveOutcome, SnapshotDiff, Workspace,
};
