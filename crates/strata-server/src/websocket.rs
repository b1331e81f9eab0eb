//! WebSocket push of storage events to canvas clients

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use strata_core::{NodeId, SnapshotId, ViewId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{ServerState, autosave};

/// Events pushed to every connected canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    ViewSaved {
        view: ViewId,
        snapshot: SnapshotId,
        created_nodes: Vec<NodeId>,
    },
    SnapshotSwitched {
        view: ViewId,
        snapshot: SnapshotId,
    },
    SnapshotCreated {
        view: ViewId,
        snapshot: SnapshotId,
        label: String,
    },
    SnapshotDeleted {
        view: ViewId,
        snapshot: SnapshotId,
        current: SnapshotId,
    },
    NodeDeleted {
        node: NodeId,
        views: Vec<ViewId>,
    },
    /// A debounced save could not be written.
    SaveFailed {
        view: ViewId,
        message: String,
    },
}

/// An event with its position in the server's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub sequence: u64,
    #[serde(flatten)]
    pub event: WsEvent,
}

/// Messages a canvas may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Write buffered edits for a view now, e.g. before the tab closes.
    Flush { view: ViewId },
    Ping,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();

    let state_clone = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => handle_client_message(message, &state_clone).await,
                    Err(e) => warn!("Ignoring malformed WebSocket message: {}", e),
                },
                Message::Close(_) => {
                    debug!("WebSocket client sent close");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        debug!("WebSocket send failed, dropping client");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}

async fn handle_client_message(message: ClientMessage, state: &ServerState) {
    match message {
        ClientMessage::Flush { view } => {
            if let Err(e) = autosave::flush(state, &view).await {
                warn!("Flush requested over WebSocket failed for {}: {}", view, e);
            }
        }
        ClientMessage::Ping => debug!("Received ping"),
    }
}
