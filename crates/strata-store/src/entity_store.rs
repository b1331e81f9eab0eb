//! The global entity pool on disk, behind a short-lived read cache

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use strata_core::{GraphState, check_pool};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::error::{Result, StoreError};
use crate::format::{self, ENTITY_FORMAT_VERSION};
use crate::port::FilePort;

/// Cached copy of the pool with the time it was loaded
#[derive(Debug, Clone)]
struct CacheEntry {
    state: GraphState,
    loaded: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.loaded.elapsed() > ttl
    }
}

pub struct EntityStore {
    files: Arc<dyn FilePort>,
    path: String,
    ttl: Duration,
    cache: RwLock<Option<CacheEntry>>,
    /// Bumped on every write; a load that straddles a write is not cached.
    generation: AtomicU64,
    /// Serializes read-modify-write cycles within the process.
    writer: Mutex<()>,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl EntityStore {
    pub fn new(files: Arc<dyn FilePort>, path: impl Into<String>, ttl: Duration) -> Self {
        Self {
            files,
            path: path.into(),
            ttl,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.files.exists(&self.path).await?)
    }

    /// Owned copy of the pool, from cache while it is fresh.
    pub async fn read(&self) -> Result<GraphState> {
        if let Some(entry) = self.cache.read().await.as_ref() {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.state.clone());
            }
        }

        let seen = self.generation.load(Ordering::SeqCst);
        if !self.files.exists(&self.path).await? {
            return Err(StoreError::not_found("entity file", &self.path));
        }
        let bytes = self.files.read(&self.path).await?;
        let state: GraphState = format::decode("entity", ENTITY_FORMAT_VERSION, &bytes)?;
        debug!(
            "Loaded {} nodes and {} edges from {}",
            state.nodes.len(),
            state.edges.len(),
            self.path
        );

        let mut cache = self.cache.write().await;
        if self.generation.load(Ordering::SeqCst) == seen {
            *cache = Some(CacheEntry {
                state: state.clone(),
                loaded: Instant::now(),
            });
        }
        Ok(state)
    }

    /// Persist `state` atomically and return what was written.
    ///
    /// Header counts and the `updated` stamp are recomputed here. A pool
    /// with edges pointing at missing nodes is refused.
    pub async fn write(&self, state: GraphState) -> Result<GraphState> {
        let _guard = self.writer.lock().await;
        self.persist(state).await
    }

    /// Read, apply `f`, write, as one step with respect to other writers in
    /// this process. Nothing is written when `f` fails.
    pub async fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut GraphState) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.writer.lock().await;
        let mut state = self.read().await?;
        let out = f(&mut state)?;
        self.persist(state).await?;
        Ok(out)
    }

    /// Forget the cached copy; the next read goes to storage.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *cache = None;
    }

    async fn persist(&self, mut state: GraphState) -> Result<GraphState> {
        state.refresh_metadata(Utc::now());
        check_pool(&state)?;

        let bytes = format::encode(ENTITY_FORMAT_VERSION, &state)?;
        let result = write_atomic(self.files.as_ref(), &self.path, &bytes).await;
        self.invalidate().await;
        result?;

        info!(
            "Saved entity pool: {} nodes, {} edges",
            state.metadata.node_count, state.metadata.edge_count
        );
        Ok(state)
    }
}
