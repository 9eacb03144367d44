//! Monotonic microsecond clock shared by the byte-receive tasks and the
//! control loop

use std::time::Instant;

/// Microseconds elapsed since a fixed origin
///
/// Copies share the origin, so timestamps taken in different tasks compare
/// directly.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
