//! Channel rotation and secondary-beacon timing state. Both are owned and
//! mutated only by the scheduler, at window boundaries.

use chrono::{DateTime, Duration, Utc};

/// Ordered list of one or two channel frequencies, visited round-robin.
#[derive(Debug, Clone)]
pub struct ChannelSchedule {
    frequencies: Vec<u32>,
    index: usize,
}

impl ChannelSchedule {
    pub fn new(frequencies: Vec<u32>) -> Self {
        debug_assert!(!frequencies.is_empty());
        Self {
            frequencies,
            index: 0,
        }
    }

    pub fn current(&self) -> u32 {
        self.frequencies[self.index]
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// Circular; called on every window exit path.
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.frequencies.len();
    }
}

/// When the secondary (low-duty-cycle) beacon is next due. Unset until the
/// first own-station fix is heard on the secondary channel; "unknown" is the
/// only valid uninitialized state.
#[derive(Debug, Clone)]
pub struct ExpectedBroadcast {
    next: Option<DateTime<Utc>>,
    interval: Duration,
    tolerance: Duration,
}

impl ExpectedBroadcast {
    pub fn new(interval: Duration, tolerance: Duration) -> Self {
        Self {
            next: None,
            interval,
            tolerance,
        }
    }

    pub fn is_set(&self) -> bool {
        self.next.is_some()
    }

    pub fn next(&self) -> Option<DateTime<Utc>> {
        self.next
    }

    /// Bootstrap the cycle from the fix just heard.
    pub fn initialize(&mut self, now: DateTime<Utc>) {
        self.next = Some(now + self.interval);
    }

    /// The beacon is due within the tolerance window (or already past);
    /// a primary window should end early to catch it.
    pub fn approaching(&self, now: DateTime<Utc>) -> bool {
        self.next.is_some_and(|next| next - now < self.tolerance)
    }

    /// The beacon is overdue by more than the tolerance window; a secondary
    /// window should give up.
    pub fn missed(&self, now: DateTime<Utc>) -> bool {
        self.next.is_some_and(|next| now - next > self.tolerance)
    }

    /// Step forward by whole intervals until the expected instant again lies
    /// beyond now plus tolerance. Catches up schedule drift and keeps a
    /// fresh window from immediately re-tripping `missed`.
    pub fn advance_past(&mut self, now: DateTime<Utc>) {
        if let Some(next) = &mut self.next {
            while *next < now + self.tolerance {
                *next += self.interval;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_next(&mut self, next: DateTime<Utc>) {
        self.next = Some(next);
    }
}
