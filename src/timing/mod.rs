//! Frame timestamps
//!
//! Monotonic clock used to stamp frames produced by engines.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic clock for frame timestamps
///
/// Clones share the same start instant, so frames stamped by different
/// threads of one engine stay ordered.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Arc<Instant>,
}

impl FrameClock {
    /// Create a clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Microseconds elapsed since the clock started
    #[inline]
    pub fn timestamp_us(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
