//! HTTP + WebSocket surface for canvas clients

pub mod router;
pub mod handlers;
pub mod websocket;
pub mod autosave;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_store::Workspace;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::autosave::Autosave;
use crate::websocket::{WsEnvelope, WsEvent};

/// Capacity of the event channel; slow sockets past this lag and skip.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7890,
        }
    }
}

/// State shared by every handler and socket.
pub struct ServerState {
    pub workspace: Arc<Workspace>,
    pub events_tx: broadcast::Sender<String>,
    pub autosave: Autosave,
    sequence: AtomicU64,
}

impl ServerState {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let delay = workspace.config().autosave_delay();
        Self {
            workspace,
            events_tx,
            autosave: Autosave::new(delay),
            sequence: AtomicU64::new(0),
        }
    }

    /// Send `event` to every connected socket. Returns its sequence number.
    pub fn broadcast(&self, event: WsEvent) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = WsEnvelope { sequence, event };
        match serde_json::to_string(&envelope) {
            Ok(json) => {
                if self.events_tx.send(json).is_err() {
                    debug!("No listeners for event {}", sequence);
                }
            }
            Err(e) => debug!("Could not serialize event {}: {}", sequence, e),
        }
        sequence
    }
}

pub struct StrataServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl StrataServer {
    pub fn new(workspace: Arc<Workspace>, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(ServerState::new(workspace)),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serve until the process is stopped. Buffered canvas edits are
    /// flushed on Ctrl-C before returning.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Listening on http://{}", addr);

        let app = router::create_router(self.state());
        let state = self.state();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutting down, flushing pending edits");
                    autosave::flush_all(&state).await;
                }
            })
            .await?;
        Ok(())
    }
}
