//! Connection-loss monitor.
//!
//! Tracks which URLs are currently failing for connectivity reasons. While
//! any are, the monitor is *active*: a countdown ticks once per
//! `tick` and, on reaching zero, dismisses dialogs and retries the current
//! view. When every failing URL answers again the monitor deactivates.
//!
//! Deactivation is a latch. With `hard_reload` enabled it moves to
//! [`ConnectionPhase::Reloading`] and asks the host to reinitialize; nothing
//! further happens on this monitor after that.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::FetchError;
use crate::transport::Response;

/// Host hooks the monitor drives during recovery.
pub trait Recovery: Send + Sync + 'static {
    /// Close any open modal dialogs before an automatic retry.
    fn dismiss_dialogs(&self) {}

    /// Re-run the current view's data load.
    fn reload_view(&self) -> BoxFuture<'static, Result<(), FetchError>>;

    /// Reinitialize the whole application after recovery.
    fn hard_reload(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Normal,
    Lost,
    Reloading,
}

/// Banner state published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub phase: ConnectionPhase,
    pub is_active: bool,
    pub is_reload: bool,
    pub countdown_secs: u32,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub countdown_secs: u32,
    pub tick: Duration,
    pub hard_reload: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            countdown_secs: 60,
            tick: Duration::from_secs(1),
            hard_reload: true,
        }
    }
}

impl From<&pulse_config::PulseConfig> for MonitorSettings {
    fn from(config: &pulse_config::PulseConfig) -> Self {
        Self {
            countdown_secs: config.connection.countdown_secs(),
            tick: Duration::from_secs(1),
            hard_reload: config.connection.hard_reload(),
        }
    }
}

#[derive(Default)]
struct MonitorInner {
    failing_urls: HashSet<String>,
    ticker: Option<CancellationToken>,
    attempt_in_progress: bool,
}

pub struct ConnectionMonitor {
    settings: MonitorSettings,
    inner: Mutex<MonitorInner>,
    state: watch::Sender<ConnectionSnapshot>,
    recovery: Mutex<Option<Arc<dyn Recovery>>>,
    this: Weak<ConnectionMonitor>,
}

impl ConnectionMonitor {
    pub fn new(settings: MonitorSettings) -> Arc<Self> {
        let initial = ConnectionSnapshot {
            phase: ConnectionPhase::Normal,
            is_active: false,
            is_reload: false,
            countdown_secs: settings.countdown_secs,
        };
        Arc::new_cyclic(|this| Self {
            settings,
            inner: Mutex::new(MonitorInner::default()),
            state: watch::channel(initial).0,
            recovery: Mutex::new(None),
            this: this.clone(),
        })
    }

    fn inner(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_recovery(&self, recovery: Arc<dyn Recovery>) {
        *self.recovery.lock().unwrap_or_else(PoisonError::into_inner) = Some(recovery);
    }

    fn recovery(&self) -> Option<Arc<dyn Recovery>> {
        self.recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.borrow().phase
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active
    }

    /// Navigation is refused while the banner is up, unless a hard reload
    /// is already underway.
    pub fn allows_navigation(&self) -> bool {
        let state = self.state.borrow();
        !state.is_active || state.is_reload
    }

    /// URLs currently failing, sorted.
    pub fn failing_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.inner().failing_urls.iter().cloned().collect();
        urls.sort();
        urls
    }

    /// Feed the outcome of a request for `url`.
    ///
    /// Connectivity failures add the URL and activate. Any response from the
    /// server, error status included, clears it. Cancellations are ignored.
    pub fn observe(&self, url: &str, outcome: &Result<Response, FetchError>) {
        if self.phase() == ConnectionPhase::Reloading {
            return;
        }
        match outcome {
            Err(FetchError::Cancelled { .. }) => {}
            Err(FetchError::Connectivity { message }) => {
                let newly_failing = self.inner().failing_urls.insert(url.to_string());
                if newly_failing {
                    warn!(
                        event = "core.connection.url_unreachable",
                        url = url,
                        error = %message
                    );
                }
                self.activate();
            }
            Ok(_) | Err(FetchError::Application { .. }) | Err(FetchError::Decode { .. }) => {
                let recovered = {
                    let mut inner = self.inner();
                    inner.failing_urls.remove(url) && inner.failing_urls.is_empty()
                };
                if recovered {
                    info!(event = "core.connection.all_urls_reachable", last_url = url);
                    self.deactivate();
                }
            }
        }
    }

    /// Raise the banner and start the countdown. No-op if already active.
    pub fn activate(&self) {
        let started = self.state.send_if_modified(|state| {
            if state.is_active || state.is_reload {
                return false;
            }
            state.phase = ConnectionPhase::Lost;
            state.is_active = true;
            state.countdown_secs = self.settings.countdown_secs;
            true
        });
        if started {
            warn!(
                event = "core.connection.lost",
                countdown_secs = self.settings.countdown_secs
            );
            self.start_ticker();
        }
    }

    fn start_ticker(&self) {
        let token = CancellationToken::new();
        if let Some(old) = self.inner().ticker.replace(token.clone()) {
            old.cancel();
        }

        let weak = self.this.clone();
        let tick = self.settings.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(monitor) = weak.upgrade() else { break };
                        if monitor.count_down() {
                            if let Some(recovery) = monitor.recovery() {
                                recovery.dismiss_dialogs();
                            }
                            monitor.retry_now().await;
                            break;
                        }
                    }
                }
            }
        });
    }

    fn stop_ticker(&self) {
        if let Some(token) = self.inner().ticker.take() {
            token.cancel();
        }
    }

    /// Decrement the countdown. Returns true once it has run out.
    fn count_down(&self) -> bool {
        let mut expired = false;
        self.state.send_if_modified(|state| {
            if !state.is_active {
                return false;
            }
            state.countdown_secs = state.countdown_secs.saturating_sub(1);
            expired = state.countdown_secs == 0;
            true
        });
        expired
    }

    /// Retry the current view immediately.
    ///
    /// Success deactivates. Failure resets the countdown and restarts it.
    /// Concurrent attempts collapse into the one already running.
    pub async fn retry_now(&self) {
        {
            let mut inner = self.inner();
            if inner.attempt_in_progress || self.phase() != ConnectionPhase::Lost {
                return;
            }
            inner.attempt_in_progress = true;
            if let Some(token) = inner.ticker.take() {
                token.cancel();
            }
        }

        info!(event = "core.connection.retry_started");
        let result = match self.recovery() {
            Some(recovery) => recovery.reload_view().await,
            None => Err(FetchError::connectivity("no recovery hook installed")),
        };
        self.inner().attempt_in_progress = false;

        match result {
            Ok(()) => {
                info!(event = "core.connection.retry_completed");
                self.deactivate();
            }
            Err(e) => {
                warn!(event = "core.connection.retry_failed", error = %e);
                let still_lost = self.state.send_if_modified(|state| {
                    if state.phase != ConnectionPhase::Lost {
                        return false;
                    }
                    state.countdown_secs = self.settings.countdown_secs;
                    true
                });
                if still_lost {
                    self.start_ticker();
                }
            }
        }
    }

    /// Lower the banner. Only meaningful while [`ConnectionPhase::Lost`].
    pub fn deactivate(&self) {
        if self.phase() != ConnectionPhase::Lost {
            return;
        }
        self.stop_ticker();
        self.inner().failing_urls.clear();

        let hard_reload = self.settings.hard_reload;
        let changed = self.state.send_if_modified(|state| {
            if state.phase != ConnectionPhase::Lost {
                return false;
            }
            state.is_active = false;
            state.countdown_secs = self.settings.countdown_secs;
            if hard_reload {
                state.phase = ConnectionPhase::Reloading;
                state.is_reload = true;
            } else {
                state.phase = ConnectionPhase::Normal;
            }
            true
        });
        if !changed {
            return;
        }

        if hard_reload {
            info!(event = "core.connection.hard_reload");
            if let Some(recovery) = self.recovery() {
                recovery.hard_reload();
            }
        } else {
            info!(event = "core.connection.restored");
        }
    }
}

impl ConnectionMonitor {
    /// Stop the countdown and release the recovery hook. Used on logout.
    pub fn shutdown(&self) {
        self.stop_ticker();
        self.recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(event = "core.connection.shutdown");
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = inner.ticker.take() {
            token.cancel();
        }
    }
}
