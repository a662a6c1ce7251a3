//! Periodic fetch loop bound to a scope.
//!
//! A `Poller` owns one driver task. The task runs fetch → settle → wait in
//! strict sequence, so at most one fetch is ever in flight. Reload signals
//! wake the wait early and are coalesced; a reload that lands mid-fetch
//! starts the next cycle as soon as the current one settles.

mod interval;

pub use interval::IntervalPolicy;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Notify, broadcast, watch};
use tracing::{debug, warn};

use crate::errors::FetchError;
use crate::events::EventBus;
use crate::scope::{Scope, TeardownId};

/// Raised when a reload signal arrives, lowered when its cycle settles.
pub type SpinnerFlag = Arc<dyn Fn(bool) + Send + Sync>;

/// What a subscriber receives at the end of a cycle.
#[derive(Debug)]
pub enum PollUpdate<'a, T> {
    Value {
        current: &'a T,
        previous: Option<&'a T>,
    },
    Error(&'a FetchError),
}

type FetchFuture<T> = BoxFuture<'static, Result<T, FetchError>>;
type FetchFn<T> = Box<dyn Fn(Option<T>) -> FetchFuture<T> + Send + Sync>;
type Subscriber<T> = Arc<Mutex<dyn FnMut(PollUpdate<'_, T>) + Send>>;

/// Latest outcome, for consumers that prefer a typed slot to a callback.
pub type PollSlot<T> = watch::Receiver<Option<Result<T, FetchError>>>;

pub struct Poller<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Poller<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<T> {
    scope: Scope,
    teardown: TeardownId,
    fetch: FetchFn<T>,
    state: Mutex<State<T>>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
    /// Held while subscribers run. `destroy` takes it too, so a teardown on
    /// another thread waits out the delivery in progress.
    delivery: Mutex<()>,
    delivering_on: Mutex<Option<ThreadId>>,
    reload: Notify,
    loading: watch::Sender<bool>,
    paused: watch::Sender<bool>,
}

/// Records which thread is delivering, so a subscriber that tears down its
/// own scope does not wait on itself.
struct DeliveringOn<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> DeliveringOn<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for DeliveringOn<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

struct State<T> {
    interval: IntervalPolicy<T>,
    error_backoff: Duration,
    latest: Option<T>,
    launched: bool,
    forget_latest: bool,
    queued_spinners: Vec<SpinnerFlag>,
    active_spinners: Vec<SpinnerFlag>,
}

/// Result of one cycle, owned so it can be delivered outside the state lock.
enum Settled<T> {
    Value { current: T, previous: Option<T> },
    Failed(FetchError),
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bind `fetch` to `scope`. Nothing runs until [`cycle`](Self::cycle).
    ///
    /// `fetch` receives the previous value, or `None` on the first call and
    /// after a reload that drops it.
    pub fn new<F, Fut>(scope: &Scope, fetch: F) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<T>>| {
            let weak = weak.clone();
            let teardown = scope.on_teardown(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.destroy();
                }
            });

            Shared {
                scope: scope.clone(),
                teardown,
                fetch: Box::new(move |previous| fetch(previous).boxed()),
                state: Mutex::new(State {
                    interval: IntervalPolicy::Once,
                    error_backoff: pulse_config::PollConfig::default().error_backoff(),
                    latest: None,
                    launched: false,
                    forget_latest: false,
                    queued_spinners: Vec::new(),
                    active_spinners: Vec::new(),
                }),
                subscribers: Mutex::new(Vec::new()),
                delivery: Mutex::new(()),
                delivering_on: Mutex::new(None),
                reload: Notify::new(),
                loading: watch::channel(false).0,
                paused: watch::channel(false).0,
            }
        });

        Self { shared }
    }

    pub fn set_interval(&self, policy: impl Into<IntervalPolicy<T>>) -> &Self {
        self.shared.state().interval = policy.into();
        self
    }

    /// Delay used after failures where the policy has nothing better.
    pub fn set_error_backoff(&self, backoff: Duration) -> &Self {
        self.shared.state().error_backoff = backoff;
        self
    }

    pub fn subscribe(&self, f: impl FnMut(PollUpdate<'_, T>) + Send + 'static) -> &Self {
        if self.shared.scope.is_alive() {
            let subscriber: Subscriber<T> = Arc::new(Mutex::new(f));
            self.shared.subscribers().push(subscriber);
        }
        self
    }

    /// Subscribe through a watch slot holding the latest outcome.
    pub fn subscribe_slot(&self) -> PollSlot<T> {
        let (tx, rx) = watch::channel(None);
        self.subscribe(move |update| {
            let outcome = match update {
                PollUpdate::Value { current, .. } => Ok(current.clone()),
                PollUpdate::Error(e) => Err(e.clone()),
            };
            tx.send_replace(Some(outcome));
        });
        rx
    }

    /// Reload whenever `event` is emitted on `bus`, for as long as the scope
    /// lives.
    pub fn reload_on(&self, bus: &EventBus, event: &str, spinner: Option<SpinnerFlag>) -> &Self {
        let mut rx = bus.listen(event);
        let weak = Arc::downgrade(&self.shared);
        let token = self.shared.scope.token();
        let event = event.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => {
                        if let Err(broadcast::error::RecvError::Closed) = received {
                            break;
                        }
                        let Some(shared) = weak.upgrade() else { break };
                        debug!(event = "core.poller.reload_signal", name = %event);
                        shared.request_reload(false, spinner.clone());
                    }
                }
            }
        });
        self
    }

    /// Start the loop. The first fetch is issued before this returns, with
    /// `loading` already raised. No-op when already running or torn down.
    pub fn cycle(&self) -> &Self {
        self.shared.launch();
        self
    }

    /// Fetch now, forgetting the previous value.
    pub fn reload(&self) {
        self.shared.request_reload(false, None);
    }

    /// Fetch now, passing the previous value to the fetch.
    pub fn reload_keep_latest(&self) {
        self.shared.request_reload(true, None);
    }

    /// Stop scheduling. A fetch in flight is abandoned.
    pub fn pause(&self) {
        self.shared.paused.send_if_modified(|paused| !std::mem::replace(paused, true));
    }

    /// Resume after [`pause`](Self::pause) with an immediate fetch.
    pub fn resume(&self) {
        self.shared.paused.send_if_modified(|paused| std::mem::replace(paused, false));
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    pub fn latest(&self) -> Option<T> {
        self.shared.state().latest.clone()
    }

    /// True from fetch start until the fetch settles.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.shared.loading.subscribe()
    }

    pub fn is_destroyed(&self) -> bool {
        !self.shared.scope.is_alive()
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber<T>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launch(self: &Arc<Self>) {
        if !self.scope.is_alive() {
            return;
        }
        {
            let mut state = self.state();
            if state.launched {
                return;
            }
            state.launched = true;
        }

        let paused = self.paused.subscribe();
        let first = if *paused.borrow() {
            None
        } else {
            Some(self.start_fetch())
        };
        debug!(event = "core.poller.started", scope = %self.scope.name());
        tokio::spawn(drive(Arc::clone(self), paused, first));
    }

    fn request_reload(self: &Arc<Self>, keep_latest: bool, spinner: Option<SpinnerFlag>) {
        if !self.scope.is_alive() {
            return;
        }
        if let Some(spinner) = &spinner {
            spinner(true);
        }
        let launched = {
            let mut state = self.state();
            if !keep_latest {
                state.forget_latest = true;
            }
            state.queued_spinners.extend(spinner);
            state.launched
        };
        if launched {
            self.reload.notify_one();
        } else {
            self.launch();
        }
    }

    /// Raise `loading` and call the fetch function for a new cycle.
    ///
    /// Any reload requested before this point is satisfied by this cycle.
    fn start_fetch(&self) -> FetchFuture<T> {
        let _ = self.reload.notified().now_or_never();
        let previous = self.begin_cycle();
        self.loading.send_replace(true);
        (self.fetch)(previous)
    }

    /// Previous value to hand to the next fetch.
    fn begin_cycle(&self) -> Option<T> {
        let mut state = self.state();
        if std::mem::take(&mut state.forget_latest) {
            state.latest = None;
        }
        let queued = std::mem::take(&mut state.queued_spinners);
        state.active_spinners.extend(queued);
        state.latest.clone()
    }

    fn lower_spinners(&self) {
        let spinners = std::mem::take(&mut self.state().active_spinners);
        for spinner in spinners {
            spinner(false);
        }
    }

    /// Apply a fetch outcome. Returns whether the cycle failed.
    fn settle(&self, outcome: Result<T, FetchError>) -> bool {
        self.lower_spinners();

        if !self.scope.is_alive() {
            debug!(
                event = "core.poller.stale_result_discarded",
                scope = %self.scope.name()
            );
            return true;
        }

        let failed = outcome.is_err();
        let settled = match outcome {
            Ok(current) => {
                let previous = self.state().latest.replace(current.clone());
                Settled::Value { current, previous }
            }
            Err(e) if e.is_cancellation() => {
                debug!(
                    event = "core.poller.cycle_cancelled",
                    scope = %self.scope.name(),
                    error = %e
                );
                return true;
            }
            Err(e) => {
                let scope = self.scope.name();
                if e.is_connectivity() {
                    warn!(event = "core.poller.cycle_failed", scope = %scope, error = %e);
                } else {
                    debug!(event = "core.poller.cycle_failed", scope = %scope, error = %e);
                }
                Settled::Failed(e)
            }
        };
        self.deliver(&settled);
        failed
    }

    fn deliver(&self, settled: &Settled<T>) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let _delivering = DeliveringOn::enter(&self.delivering_on);
        let subscribers: Vec<Subscriber<T>> = self.subscribers().clone();
        for subscriber in subscribers {
            // A subscriber may tear the scope down; later ones must not run.
            if !self.scope.is_alive() {
                return;
            }
            let mut callback = subscriber.lock().unwrap_or_else(PoisonError::into_inner);
            let update = match settled {
                Settled::Value { current, previous } => PollUpdate::Value {
                    current,
                    previous: previous.as_ref(),
                },
                Settled::Failed(e) => PollUpdate::Error(e),
            };
            (&mut *callback)(update);
        }
    }

    fn next_delay(&self, failed: bool) -> Option<Duration> {
        let state = self.state();
        state
            .interval
            .next_delay(state.latest.as_ref(), failed, state.error_backoff)
    }

    fn destroy(&self) {
        let reentrant = *self
            .delivering_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(thread::current().id());
        {
            let _delivery = (!reentrant)
                .then(|| self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
            self.subscribers().clear();
        }

        let spinners: Vec<SpinnerFlag> = {
            let mut state = self.state();
            let mut spinners = std::mem::take(&mut state.active_spinners);
            spinners.append(&mut state.queued_spinners);
            spinners
        };
        for spinner in spinners {
            spinner(false);
        }
        self.loading.send_replace(false);
        debug!(event = "core.poller.destroyed", scope = %self.scope.name());
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.scope.remove_teardown(self.teardown);
    }
}

async fn sleep_or_forever(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

async fn drive<T>(
    shared: Arc<Shared<T>>,
    mut paused: watch::Receiver<bool>,
    mut first: Option<FetchFuture<T>>,
) where
    T: Clone + Send + Sync + 'static,
{
    let token = shared.scope.token();

    'cycles: loop {
        let fetch = match first.take() {
            Some(fetch) => fetch,
            None => {
                while *paused.borrow_and_update() {
                    tokio::select! {
                        _ = token.cancelled() => break 'cycles,
                        _ = paused.changed() => {}
                    }
                }
                shared.start_fetch()
            }
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => break 'cycles,
            _ = paused.changed() => {
                debug!(event = "core.poller.fetch_abandoned", scope = %shared.scope.name());
                shared.loading.send_replace(false);
                continue 'cycles;
            }
            outcome = fetch => outcome,
        };
        shared.loading.send_replace(false);

        let failed = shared.settle(outcome);
        let delay = shared.next_delay(failed);

        tokio::select! {
            _ = token.cancelled() => break 'cycles,
            _ = shared.reload.notified() => {}
            _ = paused.changed() => {}
            _ = sleep_or_forever(delay) => {}
        }
    }

    shared.loading.send_replace(false);
    debug!(event = "core.poller.stopped", scope = %shared.scope.name());
}
