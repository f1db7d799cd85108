use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-class broadcast debounce.
///
/// State updates are never suppressed, only their fan-out: when a class
/// fires faster than the configured interval the intermediate broadcasts
/// are dropped, and the next accepted one carries the freshest snapshot.
#[derive(Debug)]
pub struct BroadcastThrottle {
    interval: Duration,
    last_sent: HashMap<&'static str, Instant>,
}

impl BroadcastThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// Whether a broadcast for `class` may go out now
    pub fn allow(&mut self, class: &'static str) -> bool {
        self.allow_at(class, Instant::now())
    }

    /// Clock-injected variant of [`BroadcastThrottle::allow`]
    pub fn allow_at(&mut self, class: &'static str, now: Instant) -> bool {
        match self.last_sent.get(class) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_sent.insert(class, now);
                true
            }
        }
    }
}
