//! Debounced persistence of canvas edits
//!
//! Each submitted canvas replaces the one pending for its view and restarts
//! that view's quiet period. Taking the pending canvas and saving it happen
//! under the view's lock, so a request that holds the lock either owns the
//! buffered canvas or runs after the save that consumed it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use strata_core::{RenderGraph, ViewId};
use strata_store::{Result, SaveOutcome};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::ServerState;
use crate::websocket::WsEvent;

#[derive(Debug)]
struct Pending {
    canvas: RenderGraph,
    generation: u64,
}

/// Held while a view's buffered canvas is taken and acted on.
pub type ViewLock = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct Autosave {
    delay: Duration,
    pending: DashMap<ViewId, Pending>,
    locks: DashMap<ViewId, Arc<Mutex<()>>>,
    generation: AtomicU64,
}

impl Autosave {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: DashMap::new(),
            locks: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_pending(&self, view: &ViewId) -> bool {
        self.pending.contains_key(view)
    }

    /// Wait for any save of `view` in flight, then hold off new ones.
    pub async fn lock(&self, view: &ViewId) -> ViewLock {
        let lock = Arc::clone(&self.locks.entry(view.clone()).or_default());
        lock.lock_owned().await
    }

    /// Lock `view` and take its buffered canvas, if any.
    pub async fn claim(&self, view: &ViewId) -> (ViewLock, Option<RenderGraph>) {
        let guard = self.lock(view).await;
        let canvas = self.pending.remove(view).map(|(_, p)| p.canvas);
        (guard, canvas)
    }

    fn put(&self, canvas: RenderGraph) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.locks.entry(canvas.view_id.clone()).or_default();
        self.pending.insert(
            canvas.view_id.clone(),
            Pending { canvas, generation },
        );
        generation
    }

    fn take_if_latest(&self, view: &ViewId, generation: u64) -> Option<RenderGraph> {
        self.pending
            .remove_if(view, |_, p| p.generation == generation)
            .map(|(_, p)| p.canvas)
    }

    /// Every view that has ever buffered a canvas, sorted so that callers
    /// locking several views agree on the order.
    fn known_views(&self) -> Vec<ViewId> {
        let mut views: Vec<ViewId> = self.locks.iter().map(|e| e.key().clone()).collect();
        views.sort();
        views
    }
}

/// Buffer `canvas` and save it once its view has been quiet for the delay.
pub fn schedule(state: &Arc<ServerState>, canvas: RenderGraph) {
    let view = canvas.view_id.clone();
    let generation = state.autosave.put(canvas);
    debug!("Canvas for view {} buffered (generation {})", view, generation);

    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::time::sleep(state.autosave.delay).await;
        let _lock = state.autosave.lock(&view).await;
        if let Some(canvas) = state.autosave.take_if_latest(&view, generation) {
            if let Err(e) = save(&state, &canvas).await {
                warn!("Autosave of view {} failed: {}", view, e);
                state.broadcast(WsEvent::SaveFailed {
                    view,
                    message: e.to_string(),
                });
            }
        }
    });
}

/// Save whatever is pending for `view` and keep the view locked.
pub async fn settle(state: &ServerState, view: &ViewId) -> Result<(ViewLock, Option<SaveOutcome>)> {
    let (lock, pending) = state.autosave.claim(view).await;
    let outcome = match pending {
        Some(canvas) => Some(save(state, &canvas).await?),
        None => None,
    };
    Ok((lock, outcome))
}

/// Save whatever is pending for `view` now.
pub async fn flush(state: &ServerState, view: &ViewId) -> Result<Option<SaveOutcome>> {
    settle(state, view).await.map(|(_, outcome)| outcome)
}

/// Settle every view, logging failures, and return the locks of all of
/// them. No autosave lands until the locks are dropped.
pub async fn settle_all(state: &ServerState) -> Vec<ViewLock> {
    let mut locks = Vec::new();
    for view in state.autosave.known_views() {
        let (lock, pending) = state.autosave.claim(&view).await;
        if let Some(canvas) = pending {
            if let Err(e) = save(state, &canvas).await {
                warn!("Flush of view {} failed: {}", view, e);
            }
        }
        locks.push(lock);
    }
    locks
}

/// Flush every view, logging failures.
pub async fn flush_all(state: &ServerState) {
    drop(settle_all(state).await);
}

async fn save(state: &ServerState, canvas: &RenderGraph) -> Result<SaveOutcome> {
    let outcome = state.workspace.save_canvas(canvas).await?;
    state.broadcast(WsEvent::ViewSaved {
        view: outcome.view_id.clone(),
        snapshot: outcome.snapshot_id.clone(),
        created_nodes: outcome.created_nodes.clone(),
    });
    Ok(outcome)
}
