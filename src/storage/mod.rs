//! Disk-backed asset handling
//!
//! The media directory is the only persisted state in the system:
//! - [`AssetStore`] derives records by scanning it on demand
//! - [`UploadController`] gates inbound transfers (single-flight + quota)
//! - [`RetentionSweeper`] evicts assets past the configured age

mod assets;
mod retention;
mod upload;

pub use assets::{AssetRecord, AssetStore};
pub use retention::RetentionSweeper;
pub use upload::{UploadController, UploadGuard};
