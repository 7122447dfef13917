//! Time sources.
//!
//! Simulation code reads time only through [`Clock`], in whole milliseconds
//! since the clock's epoch, so tests can drive it by hand.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Milliseconds since this clock's epoch. Never decreases.
    fn now_ms(&self) -> u64;
}

/// Readings of a fresh [`TokioClock`]. Starting well above zero leaves room
/// to backdate timestamps taken right after startup.
pub const HEAD_START_MS: u64 = 60 * 60 * 1000;

/// Monotonic clock backed by `tokio::time`, so a paused test runtime
/// (`start_paused = true`) advances it deterministically.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    epoch: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        HEAD_START_MS + self.epoch.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for unit tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(16);
        assert_eq!(clock.now_ms(), 116);
        clock.set(5_000);
        assert_eq!(clock.now_ms(), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        assert_eq!(clock.now_ms(), HEAD_START_MS);
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), HEAD_START_MS + 250);
    }
}
