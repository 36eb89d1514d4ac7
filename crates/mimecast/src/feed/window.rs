//! Sliding-window bookkeeping for the rolling feed
//!
//! Pure functions and a plain map, testable without threads or clocks.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::HeldMessageId;

/// Lookback used by the `poll_count`-th poll (1-based).
///
/// Grows by one interval per poll and is capped at `window`, so the first
/// poll only scans one interval.
pub fn lookback_for(poll_count: u32, poll_interval: Duration, window: Duration) -> Duration {
    poll_interval.saturating_mul(poll_count.max(1)).min(window)
}

/// Oldest instant covered by a poll at `now` with the given lookback
pub fn window_floor(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lookback)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Ids already delivered, with the time each message was received
#[derive(Debug, Default)]
pub struct SeenSet {
    entries: HashMap<HeldMessageId, DateTime<Utc>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; returns false if it was already present
    pub fn insert(&mut self, id: HeldMessageId, received: DateTime<Utc>) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, received);
        true
    }

    pub fn contains(&self, id: &HeldMessageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Drop every entry received before `floor`; returns how many were dropped
    pub fn evict_before(&mut self, floor: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, received| *received >= floor);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_lookback_grows_then_caps() {
        let window = 30 * MINUTE;
        let interval = 5 * MINUTE;
        assert_eq!(lookback_for(1, interval, window), 5 * MINUTE);
        assert_eq!(lookback_for(2, interval, window), 10 * MINUTE);
        assert_eq!(lookback_for(6, interval, window), 30 * MINUTE);
        // 7 polls would be 35 minutes uncapped
        assert_eq!(lookback_for(7, interval, window), 30 * MINUTE);
        assert_eq!(lookback_for(u32::MAX, interval, window), 30 * MINUTE);
    }

    #[test]
    fn test_lookback_treats_zero_as_first_poll() {
        assert_eq!(lookback_for(0, MINUTE, 10 * MINUTE), MINUTE);
    }

    #[test]
    fn test_window_floor() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let floor = window_floor(now, 30 * MINUTE);
        assert_eq!(floor, Utc.with_ymd_and_hms(2024, 5, 1, 11, 30, 0).unwrap());
    }

    #[test]
    fn test_window_floor_saturates() {
        let now = Utc::now();
        assert_eq!(
            window_floor(now, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[test]
    fn test_seen_set_dedup() {
        let mut seen = SeenSet::new();
        let at = Utc::now();
        assert!(seen.insert(HeldMessageId::new("m1"), at));
        assert!(!seen.insert(HeldMessageId::new("m1"), at));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_seen_set_eviction_bounds_size() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut seen = SeenSet::new();
        for (id, minutes_ago) in [("old", 45), ("edge", 30), ("recent", 5)] {
            seen.insert(
                HeldMessageId::new(id),
                now - TimeDelta::minutes(minutes_ago),
            );
        }

        let evicted = seen.evict_before(window_floor(now, 30 * MINUTE));
        assert_eq!(evicted, 1);
        assert!(!seen.contains(&HeldMessageId::new("old")));
        assert!(seen.contains(&HeldMessageId::new("edge")));
        assert!(seen.contains(&HeldMessageId::new("recent")));
    }
}
