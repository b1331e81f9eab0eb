//! Axum router setup for the Strata server

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{
        add_node, create_snapshot, delete_node, delete_snapshot, diff_snapshots, flush_view,
        get_view, health_check, list_snapshots, list_views, put_canvas, rename_snapshot,
        reorder_snapshots, switch_snapshot, validate,
    },
    websocket::ws_handler,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // WebSocket endpoint for save and timeline events
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_check))
        .route("/api/validate", get(validate))
        // Views and their canvases
        .route("/api/views", get(list_views))
        .route("/api/views/:view", get(get_view).put(put_canvas))
        .route("/api/views/:view/flush", post(flush_view))
        .route("/api/views/:view/nodes", post(add_node))
        .route("/api/views/:view/diff", get(diff_snapshots))
        // Timeline
        .route(
            "/api/views/:view/snapshots",
            get(list_snapshots).post(create_snapshot),
        )
        .route("/api/views/:view/snapshots/order", put(reorder_snapshots))
        .route(
            "/api/views/:view/snapshots/:snapshot",
            patch(rename_snapshot).delete(delete_snapshot),
        )
        .route(
            "/api/views/:view/snapshots/:snapshot/switch",
            post(switch_snapshot),
        )
        // Entity pool
        .route("/api/nodes/:node", delete(delete_node))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
