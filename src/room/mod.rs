//! Real-time coordination core
//!
//! This module owns all shared session state:
//! - Participant admission and presence (capacity-bounded roster)
//! - Synchronized playback state replication (last-writer-wins)
//! - Peer call signaling (per-pair state machine with revocable expiry timers)
//! - Broadcast fan-out with per-class debouncing
//!
//! Each concern mutates only its own state; the [`Room`] dispatcher is the
//! single entry point serializing every inbound event and timer firing.

mod call;
mod participant;
mod playback;
mod room;
mod throttle;

pub use call::{CallState, CallTable, PairKey};
pub use participant::{Participant, ParticipantId, Roster};
pub use playback::{PlaybackEvent, PlaybackState};
pub use room::{OutboundSender, Room};
pub use throttle::BroadcastThrottle;
