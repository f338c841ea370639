//! Monotonic time sources
//!
//! The store never reads wall-clock time directly. Production code uses
//! [`MonotonicClock`]; tests drive a [`ManualClock`] so every lock and
//! staleness boundary can be hit exactly.

use basin_types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// `Instant` corresponding to a timestamp of this clock
    pub fn instant_at(&self, at: Timestamp) -> Instant {
        self.origin + Duration::from_millis(at.as_millis())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.origin.elapsed().as_millis() as u64)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(ms)),
        }
    }

    pub fn advance(&self, by: Duration) -> Timestamp {
        let ms = by.as_millis() as u64;
        Timestamp::from_millis(self.millis.fetch_add(ms, Ordering::SeqCst) + ms)
    }

    pub fn advance_ms(&self, ms: u64) -> Timestamp {
        self.advance(Duration::from_millis(ms))
    }

    /// Move to `at`. Never goes backwards.
    pub fn set(&self, at: Timestamp) {
        self.millis.fetch_max(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
