use crate::event::EventTypeSchema;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of engine time, in milliseconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time as Unix milliseconds
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Externally driven time, for replay and tests.
///
/// Cloned handles share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            time: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, time: i64) {
        self.time.store(time, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.time.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.time.load(Ordering::SeqCst)
    }
}

/// Engine configuration
#[derive(Clone)]
pub struct EngineConfig {
    pub name: String,
    pub clock: Arc<dyn Clock>,
    /// Event types registered when the engine is created
    pub event_types: Vec<(String, EventTypeSchema)>,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn add_event_type(mut self, name: impl Into<String>, schema: EventTypeSchema) -> Self {
        self.event_types.push((name.into(), schema));
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            clock: Arc::new(SystemClock),
            event_types: Vec::new(),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("name", &self.name)
            .field("event_types", &self.event_types)
            .finish_non_exhaustive()
    }
}
