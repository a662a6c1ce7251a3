//! Action cooldowns.
//!
//! Manually triggered actions (compaction, rebalance retries) are keyed by
//! their target URL. Triggering starts a cooldown; further triggers of the
//! same key are suppressed until it expires. Expired entries are swept
//! periodically and their rollback runs exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::RequestClient;
use crate::errors::FetchError;
use crate::transport::{Request, RequestGroup, Response};

type Rollback = Box<dyn FnOnce() + Send>;

/// Stand-in deadline for periods too long to represent, roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + period`, clamped instead of overflowing.
pub(crate) fn deadline_after(now: Instant, period: Duration) -> Instant {
    now.checked_add(period)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

struct Cooldown {
    triggered_at: Instant,
    deadline: Instant,
    rollback: Rollback,
}

impl Cooldown {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

pub struct ActionTracker {
    cooldown: Duration,
    entries: Mutex<HashMap<String, Cooldown>>,
}

impl ActionTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Cooldown>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a cooldown for `key`.
    ///
    /// Returns false when a live cooldown already exists; the existing
    /// deadline and rollback are kept and `rollback` is dropped unused. An
    /// expired entry has its rollback run before the new cooldown starts.
    pub fn register_triggered(&self, key: &str, rollback: impl FnOnce() + Send + 'static) -> bool {
        let now = Instant::now();
        let expired = {
            let mut entries = self.entries();
            match entries.get(key).map(|entry| entry.is_expired(now)) {
                Some(false) => {
                    debug!(event = "core.debounce.trigger_suppressed", key = key);
                    return false;
                }
                Some(true) => entries.remove(key),
                None => None,
            }
        };
        if let Some(entry) = expired {
            (entry.rollback)();
        }

        let mut entries = self.entries();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(
            key.to_string(),
            Cooldown {
                triggered_at: now,
                deadline: deadline_after(now, self.cooldown),
                rollback: Box::new(rollback),
            },
        );
        info!(
            event = "core.debounce.triggered",
            key = key,
            cooldown_ms = self.cooldown.as_millis() as u64
        );
        true
    }

    /// Start a cooldown for `url` and POST to it.
    ///
    /// Returns `Ok(None)` without touching the network while a cooldown for
    /// `url` is live.
    pub async fn register_triggered_and_submit(
        &self,
        client: &RequestClient,
        url: &str,
        rollback: impl FnOnce() + Send + 'static,
    ) -> Result<Option<Response>, FetchError> {
        if !self.register_triggered(url, rollback) {
            return Ok(None);
        }
        let request = Request::post(url).in_group(RequestGroup::Global);
        client.send(request).await.map(Some)
    }

    /// True when no live cooldown exists for `key`.
    pub fn can_trigger(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries()
            .get(key)
            .is_none_or(|entry| entry.is_expired(now))
    }

    /// Forget `key` without running its rollback.
    pub fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Keys with a tracked cooldown and when each was triggered.
    pub fn started(&self) -> Vec<(String, Instant)> {
        let mut started: Vec<(String, Instant)> = self
            .entries()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.triggered_at))
            .collect();
        started.sort_by_key(|(_, at)| *at);
        started
    }

    /// Drop expired cooldowns and run their rollbacks outside the lock.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, Cooldown)> = {
            let mut entries = self.entries();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let count = expired.len();
        for (key, entry) in expired {
            debug!(event = "core.debounce.expired", key = %key);
            (entry.rollback)();
        }
        count
    }

    /// Sweep every `every` until `shutdown` fires or the tracker is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let start = deadline_after(Instant::now(), every);
            let mut interval = tokio::time::interval_at(start, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(tracker) = weak.upgrade() else { break };
                        tracker.sweep();
                    }
                }
            }
            debug!(event = "core.debounce.sweeper_stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COMPACT: &str = "/pools/default/buckets/beer/controller/compactBucket";

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let make = move || {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cannot_trigger_during_cooldown() {
        let tracker = ActionTracker::new(Duration::from_secs(10));
        assert!(tracker.can_trigger(COMPACT));
        assert!(tracker.register_triggered(COMPACT, || {}));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!tracker.can_trigger(COMPACT));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(tracker.can_trigger(COMPACT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_trigger_keeps_deadline_and_rollback() {
        let tracker = ActionTracker::new(Duration::from_secs(10));
        let (count, make) = counter();
        assert!(tracker.register_triggered(COMPACT, make()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!tracker.register_triggered(COMPACT, make()));

        // Original deadline still applies: 10s from the first trigger.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(tracker.can_trigger(COMPACT));
        assert_eq!(tracker.sweep(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_after_expiry_runs_rollback_first() {
        let tracker = ActionTracker::new(Duration::from_secs(10));
        let (count, make) = counter();
        tracker.register_triggered(COMPACT, make());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(tracker.register_triggered(COMPACT, make()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!tracker.can_trigger(COMPACT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_leaves_live_entries() {
        let tracker = ActionTracker::new(Duration::from_secs(10));
        tracker.register_triggered("/a", || {});
        tokio::time::sleep(Duration::from_secs(6)).await;
        tracker.register_triggered("/b", || {});
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(tracker.sweep(), 1);
        let keys: Vec<String> = tracker.started().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["/b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_skips_rollback() {
        let tracker = ActionTracker::new(Duration::from_secs(10));
        let (count, make) = counter();
        tracker.register_triggered(COMPACT, make());

        assert!(tracker.remove(COMPACT));
        assert!(!tracker.remove(COMPACT));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(tracker.sweep(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_rollback_once() {
        let tracker = Arc::new(ActionTracker::new(Duration::from_secs(10)));
        let shutdown = CancellationToken::new();
        let sweeper = tracker.spawn_sweeper(Duration::from_secs(2), shutdown.clone());
        let (count, make) = counter();
        tracker.register_triggered(COMPACT, make());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!tracker.can_trigger(COMPACT));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(tracker.can_trigger(COMPACT));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(tracker.started().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_may_reenter_tracker() {
        let tracker = Arc::new(ActionTracker::new(Duration::from_secs(1)));
        let t = tracker.clone();
        tracker.register_triggered(COMPACT, move || {
            t.remove("/other");
            assert!(t.can_trigger(COMPACT));
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tracker.sweep(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_does_not_overflow() {
        let tracker = ActionTracker::new(Duration::MAX);
        assert!(tracker.register_triggered(COMPACT, || {}));

        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert!(!tracker.can_trigger(COMPACT));
        assert_eq!(tracker.sweep(), 0);
    }
}
