//! Rolling feed of newly held messages
//!
//! A background poller re-scans a trailing time window on a fixed cadence,
//! suppresses ids it has already delivered and hands new ones to a
//! consumer.

mod rolling;
mod window;

pub use rolling::{FeedIter, FeedStats, RollingFeed};
pub use window::{SeenSet, lookback_for, window_floor};

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{MimecastError, Result};
use crate::models::HeldMessage;

/// Source of hold-queue entries for a time range
///
/// Implemented by [`crate::Session`]; tests plug in scripted sources.
pub trait HoldSource: Send + Sync {
    fn held_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<HeldMessage>>;
}

/// How a feed polls and how its consumer waits
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Maximum lookback of a single poll
    pub window: Duration,
    /// Sleep between polls
    pub poll_interval: Duration,
    /// Block the consumer for future items instead of ending when drained
    pub auto_poll: bool,
}

impl FeedOptions {
    /// Saturates on overflow; `validate` then rejects the out-of-range window
    pub fn minutes(window_minutes: u64, poll_interval_minutes: u64) -> Self {
        Self {
            window: Duration::from_secs(window_minutes.saturating_mul(60)),
            poll_interval: Duration::from_secs(poll_interval_minutes.saturating_mul(60)),
            auto_poll: true,
        }
    }

    pub fn with_auto_poll(mut self, auto_poll: bool) -> Self {
        self.auto_poll = auto_poll;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(MimecastError::InvalidFeedOptions(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.window < self.poll_interval {
            return Err(MimecastError::InvalidFeedOptions(format!(
                "window ({:?}) is shorter than the poll interval ({:?})",
                self.window, self.poll_interval
            )));
        }
        if chrono::TimeDelta::from_std(self.window).is_err() {
            return Err(MimecastError::InvalidFeedOptions(format!(
                "window ({:?}) is out of range",
                self.window
            )));
        }
        Ok(())
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::minutes(30, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes() {
        let options = FeedOptions::minutes(30, 5);
        assert_eq!(options.window, Duration::from_secs(1800));
        assert_eq!(options.poll_interval, Duration::from_secs(300));
        assert!(options.auto_poll);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let options = FeedOptions::minutes(30, 0);
        assert!(matches!(
            options.validate(),
            Err(MimecastError::InvalidFeedOptions(_))
        ));
    }

    #[test]
    fn test_window_shorter_than_interval_rejected() {
        assert!(FeedOptions::minutes(1, 5).validate().is_err());
    }

    #[test]
    fn test_huge_window_rejected() {
        let options = FeedOptions::minutes(u64::MAX / 10, 1);
        assert!(matches!(
            options.validate(),
            Err(MimecastError::InvalidFeedOptions(_))
        ));
    }
}
