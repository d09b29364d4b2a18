//! # Clocks
//!
//! The contracts only ever ask one question about time: "has this campaign's
//! deadline passed yet?" The answer comes from a [`Clock`] supplied by the
//! host. Production hosts use [`SystemClock`] or [`OffsetClock`]; tests use
//! [`ManualClock`] and move it forward explicitly.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Source of "current time" for deadline comparisons.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Creates a clock frozen at the Unix timestamp `secs`.
    ///
    /// Out-of-range timestamps fall back to the Unix epoch.
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Jumps to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.write();
        if let Some(next) = Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d)) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Wall clock shifted by a fixed offset.
///
/// The node persists the offset so an operator can fast-forward a devnet
/// past campaign deadlines without waiting for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetClock {
    offset_secs: i64,
}

impl OffsetClock {
    /// Creates a clock running `offset_secs` ahead of wall time.
    pub fn new(offset_secs: i64) -> Self {
        Self { offset_secs }
    }

    /// The current offset in seconds.
    pub fn offset_secs(&self) -> i64 {
        self.offset_secs
    }

    /// Pushes the offset further forward. Saturates rather than overflowing.
    pub fn advance_secs(&mut self, secs: i64) {
        self.offset_secs = self.offset_secs.saturating_add(secs);
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        Duration::try_seconds(self.offset_secs)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::at_timestamp(1_700_000_000);
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance_secs(60);
        assert_eq!(clock.now() - t0, Duration::seconds(60));
    }

    #[test]
    fn manual_clock_set_jumps() {
        let clock = ManualClock::at_timestamp(0);
        let target = DateTime::from_timestamp(1_000, 0).unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn offset_clock_runs_ahead_of_wall_time() {
        let mut clock = OffsetClock::new(0);
        clock.advance_secs(3_600);
        assert_eq!(clock.offset_secs(), 3_600);

        let wall = Utc::now();
        let shifted = clock.now();
        assert!(shifted - wall >= Duration::seconds(3_599));
    }

    #[test]
    fn offset_clock_advance_saturates() {
        let mut clock = OffsetClock::new(i64::MAX - 1);
        clock.advance_secs(10);
        assert_eq!(clock.offset_secs(), i64::MAX);
    }
}
