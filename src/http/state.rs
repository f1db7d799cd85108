use std::sync::Arc;

use crate::room::Room;
use crate::storage::{AssetStore, UploadController};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub room: Arc<Room>,
    pub assets: Arc<AssetStore>,
    pub uploads: Arc<UploadController>,
}
