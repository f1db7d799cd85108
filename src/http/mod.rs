//! HTTP + WebSocket surface
//!
//! This module exposes the system's two boundaries:
//! - GET /ws - the realtime coordination socket (join-first protocol)
//! - POST /upload - gated asset transfer
//! - GET /assets, DELETE /assets/:filename - asset management
//! - GET /health - health check
//! - /media/* - static asset delivery (external collaborator)

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
