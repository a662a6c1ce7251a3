//! Owner lifetimes.
//!
//! A `Scope` is the lifetime of a view (or of the whole engine). Tearing it
//! down cancels its token, runs its teardown callbacks once, and tears down
//! every child scope. Async work owned by a scope checks `is_alive()` before
//! touching shared state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use crate::transport::RequestGroup;

type TeardownFn = Box<dyn FnOnce() + Send>;

static NEXT_TEARDOWN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for a registered teardown callback, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TeardownId(u64);

impl TeardownId {
    fn next() -> Self {
        TeardownId(NEXT_TEARDOWN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    group: RequestGroup,
    token: CancellationToken,
    torn_down: AtomicBool,
    /// Keyed by monotonically increasing id, so iteration is registration order.
    callbacks: Mutex<BTreeMap<TeardownId, TeardownFn>>,
    /// Entry in the parent's callbacks that tears this scope down.
    parent: Option<(Weak<ScopeInner>, TeardownId)>,
}

impl ScopeInner {
    fn callbacks(&self) -> MutexGuard<'_, BTreeMap<TeardownId, TeardownFn>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.inner.name)
            .field("group", &self.inner.group)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Scope {
    pub fn root(name: impl Into<String>) -> Self {
        Self::build(
            name.into(),
            RequestGroup::Global,
            CancellationToken::new(),
            None,
        )
    }

    fn build(
        name: String,
        group: RequestGroup,
        token: CancellationToken,
        parent: Option<(Weak<ScopeInner>, TeardownId)>,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                group,
                token,
                torn_down: AtomicBool::new(false),
                callbacks: Mutex::new(BTreeMap::new()),
                parent,
            }),
        }
    }

    /// A scope that dies with this one but can also be torn down on its own.
    ///
    /// A child torn down first unregisters itself from the parent.
    pub fn child(&self, name: impl Into<String>, group: RequestGroup) -> Scope {
        let id = TeardownId::next();
        let child = Self::build(
            name.into(),
            group,
            self.inner.token.child_token(),
            Some((Arc::downgrade(&self.inner), id)),
        );

        let weak: Weak<ScopeInner> = Arc::downgrade(&child.inner);
        self.register(id, move || {
            if let Some(inner) = weak.upgrade() {
                Scope { inner }.teardown();
            }
        });
        child
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Group that requests issued on behalf of this scope should carry.
    pub fn group(&self) -> &RequestGroup {
        &self.inner.group
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.torn_down.load(Ordering::Acquire)
    }

    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Run `f` at teardown. Runs immediately if the scope is already gone.
    pub fn on_teardown(&self, f: impl FnOnce() + Send + 'static) -> TeardownId {
        let id = TeardownId::next();
        self.register(id, f);
        id
    }

    /// Drop a callback that has not run yet. Returns false if it already ran
    /// or was never registered here.
    pub fn remove_teardown(&self, id: TeardownId) -> bool {
        let removed = self.inner.callbacks().remove(&id);
        removed.is_some()
    }

    fn register(&self, id: TeardownId, f: impl FnOnce() + Send + 'static) {
        if !self.is_alive() {
            f();
            return;
        }
        let mut callbacks = self.inner.callbacks();
        // Re-check under the lock: teardown drains the map while holding it.
        if self.is_alive() {
            callbacks.insert(id, Box::new(f));
        } else {
            drop(callbacks);
            f();
        }
    }

    /// Idempotent. Callbacks run outside the lock in registration order.
    pub fn teardown(&self) {
        let callbacks = {
            let mut callbacks = self.inner.callbacks();
            if self.inner.torn_down.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *callbacks)
        };

        if let Some((parent, id)) = &self.inner.parent
            && let Some(parent) = parent.upgrade()
        {
            let detached = parent.callbacks().remove(id);
            drop(detached);
        }

        debug!(
            event = "core.scope.teardown",
            scope = %self.inner.name,
            callbacks = callbacks.len()
        );
        self.inner.token.cancel();
        for callback in callbacks.into_values() {
            callback();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_teardowns(&self) -> usize {
        self.inner.callbacks().len()
    }
}
