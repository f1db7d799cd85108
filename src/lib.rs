pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod room;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use protocol::{ClientEvent, ServerEvent};
pub use room::{
    BroadcastThrottle, Participant, ParticipantId, PlaybackEvent, PlaybackState, Room, Roster,
};
pub use storage::{AssetRecord, AssetStore, RetentionSweeper, UploadController};
