//! Background poller and blocking consumer for the hold feed

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::window::{SeenSet, lookback_for, window_floor};
use super::{FeedOptions, HoldSource};
use crate::error::{MimecastError, Result};
use crate::models::HeldMessage;

/// Counters describing the poller's progress
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedStats {
    /// Polls attempted, successful or not
    pub polls: u64,
    /// Messages handed to the pending buffer
    pub delivered: u64,
    /// Polls whose fetch failed
    pub failures: u64,
    /// Size of the seen-set after the last successful poll
    pub seen: usize,
    /// Lookback used by the last poll
    pub lookback: Duration,
}

#[derive(Default)]
struct Buffer {
    pending: VecDeque<HeldMessage>,
    closed: bool,
    stats: FeedStats,
}

#[derive(Default)]
struct Shared {
    buffer: Mutex<Buffer>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) -> bool {
        let was_open = {
            let mut buffer = self.lock();
            !std::mem::replace(&mut buffer.closed, true)
        };
        self.changed.notify_all();
        was_open
    }
}

/// Continuously growing stream of messages placed on hold
///
/// One background thread polls the source and is the only writer of the
/// seen-set; consumers drain the pending buffer in arrival order.
pub struct RollingFeed {
    shared: Arc<Shared>,
    auto_poll: bool,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RollingFeed {
    /// Validate `options` and start polling `source`
    pub fn start(source: Arc<dyn HoldSource>, options: FeedOptions) -> Result<Self> {
        options.validate()?;

        let shared = Arc::new(Shared::default());
        let auto_poll = options.auto_poll;
        info!(
            "Starting hold feed: window {:?}, poll interval {:?}",
            options.window, options.poll_interval
        );

        let poller = Poller {
            source,
            options,
            shared: Arc::clone(&shared),
            seen: SeenSet::new(),
        };
        let handle = thread::Builder::new()
            .name("hold-feed-poller".to_string())
            .spawn(move || poller.run())?;

        Ok(Self {
            shared,
            auto_poll,
            poller: Mutex::new(Some(handle)),
        })
    }

    /// Next pending message.
    ///
    /// With auto-poll on, blocks until the poller delivers something or the
    /// feed is closed. With auto-poll off, returns `StreamExhausted` as soon
    /// as the buffer is empty.
    pub fn take_next(&self) -> Result<HeldMessage> {
        let mut buffer = self.shared.lock();
        if self.auto_poll {
            buffer = self
                .shared
                .changed
                .wait_while(buffer, |b| b.pending.is_empty() && !b.closed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        buffer
            .pending
            .pop_front()
            .ok_or(MimecastError::StreamExhausted)
    }

    /// Like [`take_next`](Self::take_next) but gives up after `timeout`,
    /// returning `Ok(None)`
    pub fn take_next_timeout(&self, timeout: Duration) -> Result<Option<HeldMessage>> {
        let mut buffer = self.shared.lock();
        if self.auto_poll {
            buffer = self
                .shared
                .changed
                .wait_timeout_while(buffer, timeout, |b| b.pending.is_empty() && !b.closed)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        match buffer.pending.pop_front() {
            Some(message) => Ok(Some(message)),
            None if buffer.closed || !self.auto_poll => Err(MimecastError::StreamExhausted),
            None => Ok(None),
        }
    }

    /// Take everything currently pending without waiting
    pub fn drain_available(&self) -> Vec<HeldMessage> {
        self.shared.lock().pending.drain(..).collect()
    }

    /// Blocking iterator that ends when the feed is exhausted or closed
    pub fn iter(&self) -> FeedIter<'_> {
        FeedIter { feed: self }
    }

    pub fn stats(&self) -> FeedStats {
        self.shared.lock().stats.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Stop the poller and wake every blocked consumer.
    ///
    /// The poller exits at its next wait; this call waits for it, so an
    /// in-flight fetch is allowed to finish.
    pub fn close(&self) {
        if self.shared.close() {
            info!("Closing hold feed");
        }

        let handle = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Hold feed poller panicked");
        }
    }
}

impl Drop for RollingFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator over a feed, see [`RollingFeed::iter`]
pub struct FeedIter<'a> {
    feed: &'a RollingFeed,
}

impl Iterator for FeedIter<'_> {
    type Item = HeldMessage;

    fn next(&mut self) -> Option<HeldMessage> {
        self.feed.take_next().ok()
    }
}

struct Poller {
    source: Arc<dyn HoldSource>,
    options: FeedOptions,
    shared: Arc<Shared>,
    seen: SeenSet,
}

/// Marks the feed closed when the poller exits for any reason, including a
/// panic in the source, so consumers never wait on a dead thread
struct CloseOnExit(Arc<Shared>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Poller {
    fn run(mut self) {
        let _close = CloseOnExit(Arc::clone(&self.shared));
        let mut poll_count: u32 = 0;

        loop {
            poll_count = poll_count.saturating_add(1);
            self.poll_once(poll_count, Utc::now());
            if self.wait_or_closed() {
                break;
            }
        }
        debug!("Hold feed poller stopped after {} polls", poll_count);
    }

    fn poll_once(&mut self, poll_count: u32, now: DateTime<Utc>) {
        let lookback = lookback_for(poll_count, self.options.poll_interval, self.options.window);
        let floor = window_floor(now, lookback);

        match self.source.held_between(floor, now) {
            Ok(messages) => {
                let fresh = self.admit(messages, floor);
                let evicted = self.seen.evict_before(floor);
                debug!(
                    "Poll {}: {} new, {} evicted, {} tracked",
                    poll_count,
                    fresh.len(),
                    evicted,
                    self.seen.len()
                );

                let mut buffer = self.shared.lock();
                buffer.stats.polls += 1;
                buffer.stats.delivered += fresh.len() as u64;
                buffer.stats.seen = self.seen.len();
                buffer.stats.lookback = lookback;
                let delivered_any = !fresh.is_empty();
                buffer.pending.extend(fresh);
                drop(buffer);

                if delivered_any {
                    self.shared.changed.notify_all();
                }
            }
            Err(e) => {
                warn!("Hold list poll {} failed: {}", poll_count, e);
                let mut buffer = self.shared.lock();
                buffer.stats.polls += 1;
                buffer.stats.failures += 1;
                buffer.stats.lookback = lookback;
            }
        }
    }

    /// Keep messages not yet seen. Entries already older than the floor
    /// are skipped: they would be evicted straight away and re-delivered by
    /// a later, wider poll.
    fn admit(&mut self, messages: Vec<HeldMessage>, floor: DateTime<Utc>) -> Vec<HeldMessage> {
        messages
            .into_iter()
            .filter(|m| {
                if m.date_received < floor {
                    debug!("Ignoring {} received before the window", m.id);
                    return false;
                }
                self.seen.insert(m.id.clone(), m.date_received)
            })
            .collect()
    }

    /// Sleep one interval; returns true if the feed was closed meanwhile
    fn wait_or_closed(&self) -> bool {
        let buffer = self.shared.lock();
        let (buffer, _) = self
            .shared
            .changed
            .wait_timeout_while(buffer, self.options.poll_interval, |b| !b.closed)
            .unwrap_or_else(PoisonError::into_inner);
        buffer.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeldMessageId;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Source driven by a closure receiving the 1-based call number
    struct FnSource<F> {
        calls: AtomicU32,
        ranges: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
        f: F,
    }

    impl<F> FnSource<F>
    where
        F: Fn(u32) -> Result<Vec<HeldMessage>> + Send + Sync + 'static,
    {
        fn new(f: F) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                ranges: Mutex::new(Vec::new()),
                f,
            })
        }
    }

    impl<F> HoldSource for FnSource<F>
    where
        F: Fn(u32) -> Result<Vec<HeldMessage>> + Send + Sync,
    {
        fn held_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<HeldMessage>> {
            self.ranges.lock().unwrap().push((start, end));
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (self.f)(call)
        }
    }

    fn fast_options() -> FeedOptions {
        FeedOptions {
            window: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            auto_poll: true,
        }
    }

    fn held(id: &str) -> HeldMessage {
        HeldMessage::new(id, "ADMIN_MESSAGE_HOLD_APPLIED_SPAM_SIGNATURE", Utc::now())
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_no_auto_poll_empty_is_exhausted() {
        let source = FnSource::new(|_| Ok(Vec::new()));
        let feed = RollingFeed::start(source, fast_options().with_auto_poll(false)).unwrap();

        let started = Instant::now();
        assert!(matches!(feed.take_next(), Err(MimecastError::StreamExhausted)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_auto_poll_blocks_until_delivery() {
        let source = FnSource::new(|call| match call {
            1 | 2 => Ok(Vec::new()),
            _ => Ok(vec![held("m1")]),
        });
        let feed = RollingFeed::start(source, fast_options()).unwrap();

        let message = feed.take_next().unwrap();
        assert_eq!(message.id, HeldMessageId::new("m1"));
        assert!(feed.stats().polls >= 3);
    }

    #[test]
    fn test_duplicates_delivered_once() {
        let received = Utc::now();
        let source = FnSource::new(move |_| {
            Ok(vec![HeldMessage::new(
                "m1",
                "ADMIN_MESSAGE_HOLD_APPLIED_SPAM_SIGNATURE",
                received,
            )])
        });
        let options = FeedOptions {
            window: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            auto_poll: true,
        };
        let feed = RollingFeed::start(source, options).unwrap();

        wait_until(|| feed.stats().polls >= 4);
        let drained = feed.drain_available();
        assert_eq!(drained.len(), 1);
        assert_eq!(feed.stats().delivered, 1);
    }

    #[test]
    fn test_delivery_is_fifo() {
        let source = FnSource::new(|call| match call {
            1 => Ok(vec![held("a"), held("b"), held("c")]),
            _ => Ok(Vec::new()),
        });
        let feed = RollingFeed::start(source, fast_options()).unwrap();

        let ids: Vec<String> = feed
            .iter()
            .take(3)
            .map(|m| m.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failed_poll_does_not_stop_poller() {
        let source = FnSource::new(|call| match call {
            1 => Err(MimecastError::Request {
                path: "/api/gateway/get-hold-message-list".into(),
                status: 500,
            }),
            _ => Ok(vec![held("m1")]),
        });
        let feed = RollingFeed::start(source, fast_options()).unwrap();

        let message = feed.take_next_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(message.map(|m| m.id), Some(HeldMessageId::new("m1")));
        assert_eq!(feed.stats().failures, 1);
    }

    #[test]
    fn test_entries_older_than_window_are_ignored() {
        let source = FnSource::new(|_| {
            Ok(vec![HeldMessage::new(
                "ancient",
                "ADMIN_MESSAGE_HOLD_APPLIED_SPAM_SIGNATURE",
                Utc::now() - chrono::TimeDelta::hours(2),
            )])
        });
        let feed = RollingFeed::start(source, fast_options()).unwrap();

        wait_until(|| feed.stats().polls >= 2);
        assert!(feed.drain_available().is_empty());
        assert_eq!(feed.stats().seen, 0);
    }

    #[test]
    fn test_first_poll_scans_one_interval() {
        let source = FnSource::new(|_| Ok(Vec::new()));
        let options = FeedOptions::minutes(30, 5);
        let feed = RollingFeed::start(source.clone(), options).unwrap();

        wait_until(|| feed.stats().polls >= 1);
        let (start, end) = source.ranges.lock().unwrap()[0];
        assert_eq!(end - start, chrono::TimeDelta::minutes(5));
        assert_eq!(feed.stats().lookback, Duration::from_secs(300));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let source = FnSource::new(|_| Ok(Vec::new()));
        // Long interval: close must not wait for the next scheduled poll
        let feed = RollingFeed::start(source, FeedOptions::minutes(20, 10)).unwrap();

        let started = Instant::now();
        thread::scope(|s| {
            let consumer = s.spawn(|| feed.take_next());
            thread::sleep(Duration::from_millis(50));
            feed.close();
            assert!(matches!(
                consumer.join().unwrap(),
                Err(MimecastError::StreamExhausted)
            ));
        });
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(feed.is_closed());
    }

    #[test]
    fn test_take_next_timeout_returns_none() {
        let source = FnSource::new(|_| Ok(Vec::new()));
        let feed = RollingFeed::start(source, fast_options()).unwrap();
        assert!(
            feed.take_next_timeout(Duration::from_millis(30))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_invalid_options_rejected() {
        let source = FnSource::new(|_| Ok(Vec::new()));
        let options = FeedOptions {
            window: Duration::from_millis(5),
            poll_interval: Duration::from_millis(10),
            auto_poll: true,
        };
        assert!(matches!(
            RollingFeed::start(source, options),
            Err(MimecastError::InvalidFeedOptions(_))
        ));
    }
}
