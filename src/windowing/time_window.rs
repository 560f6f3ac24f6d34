use crate::event::SharedEvent;
use crate::window_entry::WindowEntry;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Changes produced by one window tick, in the order they happened
#[derive(Debug, Clone, Default)]
pub struct WindowDelta {
    /// Entries evicted by this tick, oldest first
    pub evicted: Vec<WindowEntry>,
    /// The entry admitted by this tick, if any
    pub inserted: Option<WindowEntry>,
}

impl WindowDelta {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.inserted.is_none()
    }
}

/// Time-based sliding window.
///
/// Keeps the events that arrived within the last `width` milliseconds, in arrival order.
/// Eviction always runs before the triggering event is admitted, so an event that has just
/// expired is never reported alongside the newest arrival.
#[derive(Debug)]
pub struct TimeWindow {
    pub name: String,
    pub width: i64,
    pub time: i64,
    entries: VecDeque<WindowEntry>,
}

impl TimeWindow {
    pub fn new(name: String, width: i64) -> Self {
        Self {
            name,
            width,
            time: i64::MIN,
            entries: VecDeque::new(),
        }
    }

    /// Evict expired entries, then admit `event` at `timestamp`.
    pub fn tick(&mut self, event: SharedEvent, timestamp: i64) -> WindowDelta {
        let now = self.advance(timestamp);

        // A zero width keeps only the current event, even when timestamps tie.
        let evicted = if self.width == 0 {
            self.entries.drain(..).collect()
        } else {
            self.evict(now)
        };

        let entry = WindowEntry::new(event, now);
        self.entries.push_back(entry.clone());

        debug!(
            window = %self.name,
            timestamp = now,
            evicted = evicted.len(),
            size = self.entries.len(),
            "Window tick"
        );

        WindowDelta {
            evicted,
            inserted: Some(entry),
        }
    }

    /// Evict expired entries without admitting anything.
    pub fn expire(&mut self, timestamp: i64) -> WindowDelta {
        let now = self.advance(timestamp);
        let evicted = self.evict(now);

        if !evicted.is_empty() {
            debug!(
                window = %self.name,
                timestamp = now,
                evicted = evicted.len(),
                size = self.entries.len(),
                "Window expired entries"
            );
        }

        WindowDelta {
            evicted,
            inserted: None,
        }
    }

    fn advance(&mut self, timestamp: i64) -> i64 {
        if timestamp < self.time {
            warn!(
                window = %self.name,
                timestamp,
                window_time = self.time,
                "Out of order timestamp, clamping to window time"
            );
            return self.time;
        }
        self.time = timestamp;
        timestamp
    }

    // Entries are in arrival order, so expired ones are always at the front.
    fn evict(&mut self, now: i64) -> Vec<WindowEntry> {
        let mut evicted = Vec::new();
        while let Some(front) = self.entries.front() {
            if !front.is_expired(now, self.width) {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                evicted.push(entry);
            }
        }
        evicted
    }

    /// Current window contents, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `[oldest, newest]` timestamps currently held, if any
    pub fn get_active_range(&self) -> Option<(i64, i64)> {
        match (self.entries.front(), self.entries.back()) {
            (Some(oldest), Some(newest)) => Some((oldest.timestamp, newest.timestamp)),
            _ => None,
        }
    }
}
