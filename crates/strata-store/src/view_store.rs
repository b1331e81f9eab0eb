//! One JSON file per view under the views directory

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use strata_core::{View, ViewId};
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::error::{Result, StoreError};
use crate::format::{self, VIEW_FORMAT_VERSION};
use crate::port::FilePort;

const VIEW_EXTENSION: &str = ".json";

#[derive(Debug, Clone)]
struct CachedView {
    view: View,
    loaded: Instant,
}

pub struct ViewStore {
    files: Arc<dyn FilePort>,
    dir: String,
    ttl: Duration,
    cache: DashMap<ViewId, CachedView>,
    /// Bumped on every write; a load that straddles a write is not cached.
    generation: AtomicU64,
}

impl std::fmt::Debug for ViewStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStore")
            .field("dir", &self.dir)
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// View ids become file names, so they are kept to a safe alphabet.
pub fn check_view_id(id: &str) -> Result<ViewId> {
    let id = id.trim();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(ViewId::from(id))
    } else {
        Err(StoreError::InvalidName(id.to_string()))
    }
}

impl ViewStore {
    pub fn new(files: Arc<dyn FilePort>, dir: impl Into<String>, ttl: Duration) -> Self {
        Self {
            files,
            dir: dir.into(),
            ttl,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn path_for(&self, id: &ViewId) -> String {
        format!("{}/{}{}", self.dir, id, VIEW_EXTENSION)
    }

    pub async fn exists(&self, id: &ViewId) -> Result<bool> {
        Ok(self.files.exists(&self.path_for(id)).await?)
    }

    /// Load a view, repairing its timeline if the stored order or current
    /// pointer drifted from the stored snapshots.
    pub async fn read(&self, id: &ViewId) -> Result<View> {
        if let Some(cached) = self.cache.get(id) {
            if cached.loaded.elapsed() <= self.ttl {
                return Ok(cached.view.clone());
            }
        }

        let seen = self.generation.load(Ordering::SeqCst);
        let path = self.path_for(id);
        if !self.files.exists(&path).await? {
            return Err(StoreError::not_found("view", id));
        }
        let bytes = self.files.read(&path).await?;
        let mut view: View = format::decode("view", VIEW_FORMAT_VERSION, &bytes)?;
        view.id = id.clone();

        let repairs = view
            .timeline
            .repair()
            .map_err(|source| StoreError::InvalidTimeline {
                view: id.clone(),
                source,
            })?;
        if !repairs.is_empty() {
            warn!("View {} needed {} timeline repair(s)", id, repairs.len());
        }

        // The entry guard holds the shard, so a writer's remove lands after us.
        let entry = self.cache.entry(id.clone());
        if self.generation.load(Ordering::SeqCst) == seen {
            entry.insert(CachedView {
                view: view.clone(),
                loaded: Instant::now(),
            });
        }
        Ok(view)
    }

    /// Stamp `updated` and persist atomically.
    pub async fn write(&self, view: &mut View) -> Result<()> {
        view.metadata.updated = Utc::now();
        let bytes = format::encode(VIEW_FORMAT_VERSION, &*view)?;
        let result = write_atomic(self.files.as_ref(), &self.path_for(&view.id), &bytes).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.remove(&view.id);
        result?;
        debug!(
            "Saved view {} ({} snapshots, current {})",
            view.id,
            view.timeline.len(),
            view.timeline.current_id()
        );
        Ok(())
    }

    /// Ids of every stored view, sorted.
    pub async fn list(&self) -> Result<Vec<ViewId>> {
        let paths = self.files.list(&self.dir).await?;
        Ok(paths
            .iter()
            .filter_map(|p| p.rsplit('/').next())
            .filter_map(|name| name.strip_suffix(VIEW_EXTENSION))
            .map(ViewId::from)
            .collect())
    }

    pub fn invalidate(&self, id: &ViewId) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.remove(id);
    }
}
