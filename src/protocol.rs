//! Wire protocol for the realtime socket
//!
//! Events are tagged JSON objects (`{"type": "...", ...}`). Inbound events
//! are dispatched as a closed enum so every kind is handled exhaustively;
//! outbound events carry full snapshots (roster, playback state) rather
//! than diffs so every client converges without reconciliation logic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room::{Participant, ParticipantId, PlaybackState};

/// Events received from a participant connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// First message on every connection; requests admission
    Join { display_name: String },

    /// Advertise current audio/video capability
    ToggleMedia { has_audio: bool, has_video: bool },

    Play { position_seconds: f64 },
    Pause { position_seconds: f64 },
    Seek { position_seconds: f64 },
    Mute,
    Unmute,
    VolumeChange { level: f64 },
    SelectAsset { name: String },

    /// Start a call with a peer; `signal` carries the SDP offer
    InitiateCall {
        peer_id: ParticipantId,
        #[serde(default)]
        signal: Option<Value>,
    },
    /// Answer a pending call; `signal` carries the SDP answer
    AcceptCall { peer_id: ParticipantId, signal: Value },
    RejectCall { peer_id: ParticipantId },
    EndCall { peer_id: ParticipantId },
    IceCandidate { peer_id: ParticipantId, candidate: Value },
}

/// Events pushed to participant connections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full roster, in admission order
    RosterUpdated { participants: Vec<Participant> },

    /// Full playback snapshot
    PlaybackState { state: PlaybackState },

    IncomingCall {
        from: ParticipantId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<Value>,
    },
    CallAccepted { from: ParticipantId, signal: Value },
    CallRejected { from: ParticipantId },
    CallTimeout { peer_id: ParticipantId },
    CallMissed { peer_id: ParticipantId },
    CallEnded { from: ParticipantId },
    CallError { reason: String },
    IceCandidate { from: ParticipantId, candidate: Value },

    UploadStart,
    UploadProgress { percent: u8, speed_kbps: u64 },
    /// Always sent when a transfer stops, with the stored filename on
    /// success and nothing on failure, so clients never get stuck
    /// believing an upload is still running
    UploadEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    /// Current upload slot state, pushed to a participant on admission
    UploadStatus { active: bool },

    AdmissionRejected { reason: String },

    /// Filenames currently available in the media directory
    AssetList { assets: Vec<String> },
    AssetDeleted { filename: String },
}

impl ServerEvent {
    /// Wire tag of this event, for the outbound logging stage
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RosterUpdated { .. } => "roster-updated",
            Self::PlaybackState { .. } => "playback-state",
            Self::IncomingCall { .. } => "incoming-call",
            Self::CallAccepted { .. } => "call-accepted",
            Self::CallRejected { .. } => "call-rejected",
            Self::CallTimeout { .. } => "call-timeout",
            Self::CallMissed { .. } => "call-missed",
            Self::CallEnded { .. } => "call-ended",
            Self::CallError { .. } => "call-error",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::UploadStart => "upload-start",
            Self::UploadProgress { .. } => "upload-progress",
            Self::UploadEnd { .. } => "upload-end",
            Self::UploadStatus { .. } => "upload-status",
            Self::AdmissionRejected { .. } => "admission-rejected",
            Self::AssetList { .. } => "asset-list",
            Self::AssetDeleted { .. } => "asset-deleted",
        }
    }
}
