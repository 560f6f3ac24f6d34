use crate::event::SharedEvent;

// Representing an event admitted to a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    pub event: SharedEvent,
    pub timestamp: i64,
}

impl WindowEntry {
    pub fn new(event: SharedEvent, timestamp: i64) -> Self {
        Self { event, timestamp }
    }

    /// An entry expires once it is older than `width` at time `now`.
    pub fn is_expired(&self, now: i64, width: i64) -> bool {
        self.timestamp < now.saturating_sub(width)
    }
}
