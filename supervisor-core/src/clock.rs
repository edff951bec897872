/// Monotonic millisecond time source
///
/// Timestamps are `u32` so they can be read and written atomically on the
/// 32-bit targets this runs on. Elapsed time is always computed with
/// wrapping arithmetic, which stays correct across the ~49 day rollover.
use std::time::Instant;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// Milliseconds since the clock was created
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        // Truncation is intended: callers only ever look at wrapping differences
        self.origin.elapsed().as_millis() as u32
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Elapsed milliseconds between two clock readings, tolerant of rollover
pub fn elapsed_ms(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_rollover() {
        assert_eq!(elapsed_ms(u32::MAX - 9, 10), 20);
        assert_eq!(elapsed_ms(1_000, 4_000), 3_000);
    }

    #[test]
    fn test_monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
