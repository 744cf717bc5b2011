//! Monotonic millisecond clock
//!
//! Pools and the event queue order entries by coarse timestamps. Wall-clock
//! time can step backwards, so bookkeeping uses millis since a fixed
//! `Instant` epoch instead.

use std::time::{Instant, SystemTime};

/// Monotonic clock anchored at construction time
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created
    #[inline]
    pub fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Microseconds elapsed since the clock was created
    #[inline]
    pub fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock Unix millis, for snapshots exported to the outside
#[inline]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
