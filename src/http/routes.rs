use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;
use super::ws;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Realtime coordination socket
        .route("/ws", get(ws::ws_handler))
        // Asset transfer and management
        .route("/upload", post(handlers::upload_asset))
        .route("/assets", get(handlers::list_assets))
        .route("/assets/:filename", delete(handlers::delete_asset))
        // Static media delivery (boundary only; no semantics of its own)
        .nest_service("/media", ServeDir::new(state.assets.dir()))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
