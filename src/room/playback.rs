use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::participant::ParticipantId;

/// A playback mutation from one participant
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Play { position_seconds: f64 },
    Pause { position_seconds: f64 },
    Seek { position_seconds: f64 },
    Mute,
    Unmute,
    Volume { level: f64 },
    SelectAsset { name: String },
}

impl PlaybackEvent {
    /// Throttle class for broadcast debouncing. Seek and volume arrive in
    /// bursts while a slider is dragged; everything else is a discrete
    /// action that always fans out.
    pub fn throttle_class(&self) -> Option<&'static str> {
        match self {
            Self::Seek { .. } => Some("seek"),
            Self::Volume { .. } => Some("volume"),
            _ => None,
        }
    }
}

/// The single shared playback snapshot.
///
/// Mutated only through [`PlaybackState::apply`], which replaces the
/// relevant fields wholesale (last-writer-wins) and stamps the writer.
/// Readers only ever see a complete snapshot, never a partial write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub position_seconds: f64,
    pub muted: bool,
    /// Volume in [0, 1]
    pub volume: f64,
    pub current_asset: Option<String>,
    pub last_writer: Option<ParticipantId>,
    #[serde(skip)]
    pub last_write: Option<Instant>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            position_seconds: 0.0,
            muted: false,
            volume: 1.0,
            current_asset: None,
            last_writer: None,
            last_write: None,
        }
    }
}

impl PlaybackState {
    /// Merge an event into the snapshot. The most recent apply wins
    /// unconditionally; there is no causal reconciliation between peers.
    pub fn apply(&mut self, event: &PlaybackEvent, origin: &str) {
        match event {
            PlaybackEvent::Play { position_seconds } => {
                self.is_playing = true;
                self.position_seconds = *position_seconds;
            }
            PlaybackEvent::Pause { position_seconds } => {
                self.is_playing = false;
                self.position_seconds = *position_seconds;
            }
            PlaybackEvent::Seek { position_seconds } => {
                self.position_seconds = *position_seconds;
            }
            PlaybackEvent::Mute => self.muted = true,
            PlaybackEvent::Unmute => self.muted = false,
            PlaybackEvent::Volume { level } => {
                self.volume = level.clamp(0.0, 1.0);
            }
            PlaybackEvent::SelectAsset { name } => {
                // Changing videos always restarts playback
                self.current_asset = Some(name.clone());
                self.is_playing = false;
                self.position_seconds = 0.0;
            }
        }

        self.last_writer = Some(origin.to_string());
        self.last_write = Some(Instant::now());
    }

    /// Back to defaults, used when the roster empties
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
