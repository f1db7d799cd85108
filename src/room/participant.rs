use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Connection-scoped opaque identifier
pub type ParticipantId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub has_audio: bool,
    pub has_video: bool,
}

impl Participant {
    /// New participant with no advertised media, like a freshly opened tab
    fn new(display_name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            has_audio: false,
            has_video: false,
        }
    }
}

/// Insertion-ordered participant set with a fixed admission ceiling.
///
/// The ceiling is checked before anything is mutated, so a rejected
/// admission leaves the roster exactly as it was.
#[derive(Debug)]
pub struct Roster {
    participants: Vec<Participant>,
    capacity: usize,
}

impl Roster {
    pub fn new(capacity: usize) -> Self {
        Self {
            participants: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Admit a new participant, or fail if the room is at capacity
    pub fn admit(&mut self, display_name: &str) -> Result<Participant> {
        if self.participants.len() >= self.capacity {
            return Err(Error::AdmissionRejected);
        }

        let participant = Participant::new(display_name);
        self.participants.push(participant.clone());
        Ok(participant)
    }

    /// Update a participant's advertised media capabilities
    pub fn update_capabilities(
        &mut self,
        id: &str,
        has_audio: bool,
        has_video: bool,
    ) -> Option<Participant> {
        let participant = self.participants.iter_mut().find(|p| p.id == id)?;
        participant.has_audio = has_audio;
        participant.has_video = has_video;
        Some(participant.clone())
    }

    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.id == id)?;
        Some(self.participants.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Current roster in admission order, for deterministic broadcasts
    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants.clone()
    }
}
