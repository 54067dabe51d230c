//! Monotonic capture timestamps.
//!
//! Every captured unit is stamped with a [`Timestamp`] read from the
//! platform's monotonic clock at nanosecond resolution. [`Timestamps`] pins a
//! monotonic reading together with wall-clock time so a recording can be
//! related back to the moment it started.

use std::time::{Duration, SystemTime};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix::monotonic_nanos;

#[cfg(not(unix))]
mod fallback;
#[cfg(not(unix))]
use fallback::monotonic_nanos;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(
    // Nanoseconds
    u64,
);

impl Timestamp {
    pub fn now() -> Self {
        Self(monotonic_nanos())
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Saturates to zero when `start` is later than `self`.
    pub fn duration_since(&self, start: Timestamp) -> Duration {
        self.checked_duration_since(start).unwrap_or(Duration::ZERO)
    }

    pub fn checked_duration_since(&self, start: Timestamp) -> Option<Duration> {
        self.0.checked_sub(start.0).map(Duration::from_nanos)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Timestamps {
    timestamp: Timestamp,
    system_time: SystemTime,
}

impl Timestamps {
    pub fn now() -> Self {
        Self {
            timestamp: Timestamp::now(),
            system_time: SystemTime::now(),
        }
    }

    pub fn system_time(&self) -> SystemTime {
        self.system_time
    }

    /// Wall-clock time at which `timestamp` was taken, assuming both clocks
    /// advanced at the same rate since the anchor.
    pub fn system_time_of(&self, timestamp: Timestamp) -> SystemTime {
        match timestamp.checked_duration_since(self.timestamp) {
            Some(ahead) => self.system_time + ahead,
            None => self
                .system_time
                .checked_sub(self.timestamp.duration_since(timestamp))
                .unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let mut previous = Timestamp::now();
        for _ in 0..1000 {
            let next = Timestamp::now();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn duration_since_saturates() {
        let early = Timestamp::from_nanos(1_000);
        let late = Timestamp::from_nanos(5_000);

        assert_eq!(late.duration_since(early), Duration::from_nanos(4_000));
        assert_eq!(early.duration_since(late), Duration::ZERO);
        assert_eq!(early.checked_duration_since(late), None);
    }

    #[test]
    fn anchor_maps_timestamps_to_wall_clock() {
        let anchor = Timestamps::now();
        let later = Timestamp::from_nanos(anchor.timestamp.as_nanos() + 2_000_000_000);

        let wall = anchor.system_time_of(later);
        assert_eq!(
            wall.duration_since(anchor.system_time()).unwrap(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn stamps_before_the_anchor_map_backwards() {
        let anchor = Timestamps {
            timestamp: Timestamp::from_nanos(3_000_000_000),
            system_time: SystemTime::UNIX_EPOCH + Duration::from_secs(100),
        };

        assert_eq!(
            anchor.system_time_of(Timestamp::from_nanos(1_000_000_000)),
            SystemTime::UNIX_EPOCH + Duration::from_secs(98)
        );
    }
}
