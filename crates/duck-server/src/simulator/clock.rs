//! Time sources for the simulator.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock anchored at construction and advanced by the tokio clock, so
/// paused test runtimes move it deterministically.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    base_utc: DateTime<Utc>,
    base_instant: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            base_utc: Utc::now(),
            base_instant: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.base_instant.elapsed()).unwrap_or(Duration::zero());
        self.base_utc + elapsed
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
