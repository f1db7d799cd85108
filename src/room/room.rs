use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::RoomConfig;
use crate::error::Result;
use crate::protocol::{ClientEvent, ServerEvent};

use super::call::{CallTable, PairKey};
use super::participant::{Participant, ParticipantId, Roster};
use super::playback::{PlaybackEvent, PlaybackState};
use super::throttle::BroadcastThrottle;

/// Outbound channel for one participant connection. Unbounded so dispatch
/// never blocks on a slow reader; the socket writer task drains it.
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;

/// The shared watch session.
///
/// All coordination state lives behind one mutex: every inbound event or
/// timer firing locks it, mutates, emits outbound events, and releases.
/// That single-writer discipline is what makes last-writer-wins playback
/// and pair-keyed call exclusivity safe without finer-grained locking.
pub struct Room {
    inner: Mutex<RoomInner>,
    call_timeout: Duration,
}

struct RoomInner {
    roster: Roster,
    playback: PlaybackState,
    calls: CallTable,
    conns: HashMap<ParticipantId, OutboundSender>,
    throttle: BroadcastThrottle,
}

/// Explicit logging stage for outbound events, applied in the send path
fn trace_outbound(to: &str, event: &ServerEvent) {
    debug!(to, kind = event.kind(), "outbound event");
}

impl RoomInner {
    fn send_to(&self, id: &str, event: ServerEvent) {
        if let Some(tx) = self.conns.get(id) {
            trace_outbound(id, &event);
            // A closed channel means the connection is tearing down and
            // its disconnect cleanup will run shortly; nothing to do here
            let _ = tx.send(event);
        }
    }

    /// Broadcast to every participant, in admission order
    fn broadcast(&self, event: &ServerEvent) {
        for participant in self.roster.snapshot() {
            self.send_to(&participant.id, event.clone());
        }
    }

    /// Broadcast to everyone except `skip` (the origin already knows)
    fn broadcast_except(&self, skip: &str, event: &ServerEvent) {
        for participant in self.roster.snapshot() {
            if participant.id != skip {
                self.send_to(&participant.id, event.clone());
            }
        }
    }

    fn roster_event(&self) -> ServerEvent {
        ServerEvent::RosterUpdated {
            participants: self.roster.snapshot(),
        }
    }

    fn playback_event(&self) -> ServerEvent {
        ServerEvent::PlaybackState {
            state: self.playback.clone(),
        }
    }
}

impl Room {
    pub fn new(cfg: &RoomConfig) -> Arc<Self> {
        Arc::new(Self {
            call_timeout: cfg.call_timeout(),
            inner: Mutex::new(RoomInner {
                roster: Roster::new(cfg.max_participants),
                playback: PlaybackState::default(),
                calls: CallTable::new(),
                conns: HashMap::new(),
                throttle: BroadcastThrottle::new(cfg.broadcast_throttle()),
            }),
        })
    }

    /// Admit a participant and register its outbound channel.
    ///
    /// On success every participant (including the new one) receives the
    /// full roster, and the joiner alone receives the current playback
    /// snapshot. On rejection nothing is mutated; the caller must close
    /// the connection rather than leave it in limbo.
    pub async fn admit(&self, display_name: &str, sender: OutboundSender) -> Result<Participant> {
        let mut inner = self.inner.lock().await;

        let participant = inner.roster.admit(display_name)?;
        inner.conns.insert(participant.id.clone(), sender);

        info!(
            "participant admitted: {} ({}), roster size {}",
            display_name,
            participant.id,
            inner.roster.len()
        );

        let roster = inner.roster_event();
        inner.broadcast(&roster);

        let playback = inner.playback_event();
        inner.send_to(&participant.id, playback);

        Ok(participant)
    }

    /// Tear down everything tied to a departed connection: its live calls
    /// end implicitly, the roster shrinks and is re-broadcast, and an
    /// empty room resets playback to defaults.
    pub async fn disconnect(&self, id: &ParticipantId) {
        let mut inner = self.inner.lock().await;

        inner.conns.remove(id);

        for session in inner.calls.end_all_for(id) {
            let other = session.pair.other(id).to_string();
            inner.send_to(&other, ServerEvent::CallEnded { from: id.clone() });
        }

        if let Some(participant) = inner.roster.remove(id) {
            info!(
                "participant left: {} ({}), roster size {}",
                participant.display_name,
                id,
                inner.roster.len()
            );

            let roster = inner.roster_event();
            inner.broadcast(&roster);

            if inner.roster.is_empty() {
                inner.playback.reset();
                info!("room empty, playback state reset");
            }
        }
    }

    /// Dispatch one inbound event from an admitted participant
    pub async fn handle_event(self: &Arc<Self>, origin: &ParticipantId, event: ClientEvent) {
        match event {
            ClientEvent::Join { .. } => {
                warn!("duplicate join from {}, ignored", origin);
            }
            ClientEvent::ToggleMedia {
                has_audio,
                has_video,
            } => self.toggle_media(origin, has_audio, has_video).await,
            ClientEvent::Play { position_seconds } => {
                self.apply_playback(origin, PlaybackEvent::Play { position_seconds })
                    .await;
            }
            ClientEvent::Pause { position_seconds } => {
                self.apply_playback(origin, PlaybackEvent::Pause { position_seconds })
                    .await;
            }
            ClientEvent::Seek { position_seconds } => {
                self.apply_playback(origin, PlaybackEvent::Seek { position_seconds })
                    .await;
            }
            ClientEvent::Mute => self.apply_playback(origin, PlaybackEvent::Mute).await,
            ClientEvent::Unmute => self.apply_playback(origin, PlaybackEvent::Unmute).await,
            ClientEvent::VolumeChange { level } => {
                self.apply_playback(origin, PlaybackEvent::Volume { level })
                    .await;
            }
            ClientEvent::SelectAsset { name } => {
                self.apply_playback(origin, PlaybackEvent::SelectAsset { name })
                    .await;
            }
            ClientEvent::InitiateCall { peer_id, signal } => {
                self.initiate_call(origin, &peer_id, signal).await;
            }
            ClientEvent::AcceptCall { peer_id, signal } => {
                self.accept_call(origin, &peer_id, signal).await;
            }
            ClientEvent::RejectCall { peer_id } => self.reject_call(origin, &peer_id).await,
            ClientEvent::EndCall { peer_id } => self.end_call(origin, &peer_id).await,
            ClientEvent::IceCandidate { peer_id, candidate } => {
                self.relay_ice(origin, &peer_id, candidate).await;
            }
        }
    }

    async fn toggle_media(&self, origin: &ParticipantId, has_audio: bool, has_video: bool) {
        let mut inner = self.inner.lock().await;

        if inner
            .roster
            .update_capabilities(origin, has_audio, has_video)
            .is_some()
        {
            let roster = inner.roster_event();
            inner.broadcast(&roster);
        }
    }

    async fn apply_playback(&self, origin: &ParticipantId, event: PlaybackEvent) {
        let mut inner = self.inner.lock().await;

        if !inner.roster.contains(origin) {
            return;
        }

        inner.playback.apply(&event, origin);

        // High-frequency classes keep the state but may skip the fan-out;
        // the next accepted tick carries the freshest snapshot anyway
        if let Some(class) = event.throttle_class() {
            if !inner.throttle.allow(class) {
                return;
            }
        }

        let snapshot = inner.playback_event();
        inner.broadcast_except(origin, &snapshot);
    }

    async fn initiate_call(
        self: &Arc<Self>,
        origin: &ParticipantId,
        peer_id: &ParticipantId,
        signal: Option<serde_json::Value>,
    ) {
        let mut inner = self.inner.lock().await;

        // Existence and capability checks go through the roster only;
        // call state itself is the table's business
        if !inner.roster.contains(peer_id) {
            inner.send_to(
                origin,
                ServerEvent::CallError {
                    reason: "callee unknown".to_string(),
                },
            );
            return;
        }

        let has_media = inner
            .roster
            .get(origin)
            .map(|p| p.has_audio || p.has_video)
            .unwrap_or(false);
        if !has_media {
            inner.send_to(
                origin,
                ServerEvent::CallError {
                    reason: "no media".to_string(),
                },
            );
            return;
        }

        match inner.calls.initiate(origin, peer_id) {
            Ok(pair) => {
                let room = Arc::clone(self);
                let expiry_pair = pair.clone();
                let timeout = self.call_timeout;
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    room.expire_call(&expiry_pair).await;
                });
                inner.calls.arm_expiry(&pair, timer.abort_handle());

                info!("call initiated: {} -> {}", origin, peer_id);
                inner.send_to(
                    peer_id,
                    ServerEvent::IncomingCall {
                        from: origin.clone(),
                        signal,
                    },
                );
            }
            Err(err) => {
                inner.send_to(
                    origin,
                    ServerEvent::CallError {
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    /// Expiry timer firing. A session that already advanced past Pending
    /// makes this a no-op; the timer token was cancelled but may already
    /// have been mid-flight.
    async fn expire_call(&self, pair: &PairKey) {
        let mut inner = self.inner.lock().await;

        if let Some(session) = inner.calls.expire(pair) {
            info!(
                "call timed out: {} -> {}",
                session.caller, session.callee
            );
            inner.send_to(
                &session.caller,
                ServerEvent::CallTimeout {
                    peer_id: session.callee.clone(),
                },
            );
            inner.send_to(
                &session.callee,
                ServerEvent::CallMissed {
                    peer_id: session.caller.clone(),
                },
            );
        }
    }

    async fn accept_call(
        &self,
        origin: &ParticipantId,
        peer_id: &ParticipantId,
        signal: serde_json::Value,
    ) {
        let mut inner = self.inner.lock().await;
        let pair = PairKey::new(origin, peer_id);

        match inner.calls.accept(&pair, origin) {
            Ok(()) => {
                info!("call accepted: {} <- {}", peer_id, origin);
                inner.send_to(
                    peer_id,
                    ServerEvent::CallAccepted {
                        from: origin.clone(),
                        signal,
                    },
                );
            }
            Err(err) => {
                inner.send_to(
                    origin,
                    ServerEvent::CallError {
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    async fn reject_call(&self, origin: &ParticipantId, peer_id: &ParticipantId) {
        let mut inner = self.inner.lock().await;
        let pair = PairKey::new(origin, peer_id);

        match inner.calls.reject(&pair, origin) {
            Ok(session) => {
                info!("call rejected: {} -> {}", session.caller, origin);
                inner.send_to(
                    &session.caller,
                    ServerEvent::CallRejected {
                        from: origin.clone(),
                    },
                );
            }
            Err(err) => {
                inner.send_to(
                    origin,
                    ServerEvent::CallError {
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    async fn end_call(&self, origin: &ParticipantId, peer_id: &ParticipantId) {
        let mut inner = self.inner.lock().await;
        let pair = PairKey::new(origin, peer_id);

        if let Some(session) = inner.calls.end(&pair, origin) {
            info!("call ended by {}", origin);
            let other = session.pair.other(origin).to_string();
            inner.send_to(&other, ServerEvent::CallEnded {
                from: origin.clone(),
            });
        } else {
            warn!("end-call from {} with no live session, ignored", origin);
        }
    }

    async fn relay_ice(
        &self,
        origin: &ParticipantId,
        peer_id: &ParticipantId,
        candidate: serde_json::Value,
    ) {
        let inner = self.inner.lock().await;

        // Late or stray candidates are dropped silently
        if inner.calls.ice_allowed(origin, peer_id) {
            inner.send_to(
                peer_id,
                ServerEvent::IceCandidate {
                    from: origin.clone(),
                    candidate,
                },
            );
        }
    }

    /// Push an event to every participant. Used by the upload controller
    /// and retention sweeper, which own no connections themselves.
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let inner = self.inner.lock().await;
        inner.broadcast(&event);
    }

    /// Push an event to one participant
    pub async fn send_to(&self, id: &ParticipantId, event: ServerEvent) {
        let inner = self.inner.lock().await;
        inner.send_to(id, event);
    }

    /// Current roster in admission order
    pub async fn roster(&self) -> Vec<Participant> {
        self.inner.lock().await.roster.snapshot()
    }

    /// Current playback snapshot
    pub async fn playback(&self) -> PlaybackState {
        self.inner.lock().await.playback.clone()
    }
}
