use std::collections::HashMap;
use std::time::Instant;
use tokio::task::AbortHandle;

use crate::error::{Error, Result};
use super::participant::ParticipantId;

/// Order-independent key for a two-party call, so at most one session can
/// exist per pair no matter who initiates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(ParticipantId, ParticipantId);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0 == id || self.1 == id
    }

    /// The member of the pair that is not `id`
    pub fn other(&self, id: &str) -> &str {
        if self.0 == id {
            &self.1
        } else {
            &self.0
        }
    }
}

/// Live call lifecycle. Idle and Ended are represented by the absence of
/// a session: one is created on initiate and removed on end, so the table
/// only ever stores these two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Initiated, waiting for the callee to accept or reject
    Pending,
    /// Accepted; signaling may flow until either side ends it
    Active,
}

#[derive(Debug)]
pub struct CallSession {
    pub pair: PairKey,
    pub caller: ParticipantId,
    pub callee: ParticipantId,
    pub state: CallState,
    pub created_at: Instant,
    expiry: Option<AbortHandle>,
}

impl CallSession {
    fn cancel_expiry(&mut self) {
        if let Some(handle) = self.expiry.take() {
            handle.abort();
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        // A removed session must never have a live timer behind it
        self.cancel_expiry();
    }
}

/// Table of live call sessions, at most one per canonical pair
#[derive(Debug, Default)]
pub struct CallTable {
    sessions: HashMap<PairKey, CallSession>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is party to any live session
    pub fn is_busy(&self, id: &str) -> bool {
        self.sessions.keys().any(|pair| pair.contains(id))
    }

    /// Create a pending session. The expiry timer is armed separately via
    /// [`CallTable::arm_expiry`] once the caller has spawned it.
    pub fn initiate(&mut self, caller: &str, callee: &str) -> Result<PairKey> {
        if self.is_busy(caller) || self.is_busy(callee) {
            return Err(Error::Call("already in a call".to_string()));
        }

        let pair = PairKey::new(caller, callee);
        self.sessions.insert(
            pair.clone(),
            CallSession {
                pair: pair.clone(),
                caller: caller.to_string(),
                callee: callee.to_string(),
                state: CallState::Pending,
                created_at: Instant::now(),
                expiry: None,
            },
        );
        Ok(pair)
    }

    /// Attach the revocable expiry token to a pending session
    pub fn arm_expiry(&mut self, pair: &PairKey, handle: AbortHandle) {
        if let Some(session) = self.sessions.get_mut(pair) {
            session.expiry = Some(handle);
        } else {
            // Session vanished between initiate and arming; kill the timer
            handle.abort();
        }
    }

    /// Callee accepts a pending call; transitions it to Active and cancels
    /// the expiry timer.
    pub fn accept(&mut self, pair: &PairKey, callee: &str) -> Result<()> {
        let session = self
            .sessions
            .get_mut(pair)
            .ok_or_else(|| Error::Call("no call with this peer".to_string()))?;

        if session.state != CallState::Pending || session.callee != callee {
            return Err(Error::Call("no pending call to accept".to_string()));
        }

        session.state = CallState::Active;
        session.cancel_expiry();
        Ok(())
    }

    /// Callee rejects a pending call; removes the session
    pub fn reject(&mut self, pair: &PairKey, callee: &str) -> Result<CallSession> {
        match self.sessions.remove(pair) {
            Some(session) if session.state == CallState::Pending && session.callee == callee => {
                Ok(session)
            }
            Some(session) => {
                // Wrong state or wrong side; put it back untouched
                self.sessions.insert(pair.clone(), session);
                Err(Error::Call("no pending call to reject".to_string()))
            }
            None => Err(Error::Call("no pending call to reject".to_string())),
        }
    }

    /// Expiry timer fired. Removes the session only if it is still
    /// pending; an accept that won the race makes this a no-op.
    pub fn expire(&mut self, pair: &PairKey) -> Option<CallSession> {
        if self.sessions.get(pair)?.state == CallState::Pending {
            self.sessions.remove(pair)
        } else {
            None
        }
    }

    /// Either party hangs up; valid for pending and active sessions
    pub fn end(&mut self, pair: &PairKey, who: &str) -> Option<CallSession> {
        if self.sessions.get(pair)?.pair.contains(who) {
            self.sessions.remove(pair)
        } else {
            None
        }
    }

    /// Implicit end of every live session `id` is party to, used on
    /// disconnect. Returns the removed sessions so the peers can be told.
    pub fn end_all_for(&mut self, id: &str) -> Vec<CallSession> {
        let pairs: Vec<PairKey> = self
            .sessions
            .keys()
            .filter(|pair| pair.contains(id))
            .cloned()
            .collect();

        pairs
            .into_iter()
            .filter_map(|pair| self.sessions.remove(&pair))
            .collect()
    }

    /// Whether an ICE candidate from `from` to `to` may be relayed.
    /// Stray candidates outside a live session are expected and harmless,
    /// so callers drop them silently instead of erroring.
    pub fn ice_allowed(&self, from: &str, to: &str) -> bool {
        self.sessions.contains_key(&PairKey::new(from, to))
    }
}
