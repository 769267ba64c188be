//! System and test implementations of the clock and random ports.

use crate::infrastructure::ports::{ClockPort, RandomPort};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Wall-clock time for node timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Thread-local RNG for node id draws and batch ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn gen_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Fixed clock for testing.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Deterministic random for testing: draws walk up from the range start.
#[cfg(test)]
pub struct SequenceRandom {
    next: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl SequenceRandom {
    pub fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
impl RandomPort for SequenceRandom {
    fn gen_range(&self, min: u64, max: u64) -> u64 {
        let step = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let span = max.saturating_sub(min).saturating_add(1);
        min + step % span
    }

    fn gen_uuid(&self) -> Uuid {
        Uuid::nil()
    }
}
