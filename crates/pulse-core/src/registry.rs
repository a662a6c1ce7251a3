//! Pending request registry.
//!
//! Every tracked outbound request is recorded here with its cancel handle so
//! that navigation and logout can abort whole groups at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use crate::transport::{Method, RequestGroup};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// A request that has been sent and not yet settled.
#[derive(Debug)]
pub struct InFlightRequest {
    id: RequestId,
    method: Method,
    url: String,
    group: RequestGroup,
    cancel: CancellationToken,
}

impl InFlightRequest {
    pub fn new(method: Method, url: impl Into<String>, group: RequestGroup) -> Arc<Self> {
        Arc::new(Self {
            id: RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)),
            method,
            url: url.into(),
            group,
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn group(&self) -> &RequestGroup {
        &self.group
    }

    /// Abort the request. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Insertion-ordered set of in-flight requests.
///
/// Bulk cancellation snapshots the entries and fires the handles outside the
/// lock, newest first. Cancelling never removes an entry; the owner removes
/// it when the request settles.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<Vec<Arc<InFlightRequest>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<InFlightRequest>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, request: Arc<InFlightRequest>) {
        debug!(
            event = "core.registry.register",
            id = request.id.0,
            method = %request.method,
            url = %request.url,
            group = %request.group
        );
        self.entries().push(request);
    }

    /// First live entry with this method and URL.
    pub fn find_in_flight(&self, method: Method, url: &str) -> Option<Arc<InFlightRequest>> {
        self.entries()
            .iter()
            .find(|r| r.method == method && r.url == url)
            .cloned()
    }

    /// Remove an entry by identity. Returns false if it was already gone.
    pub fn remove(&self, request: &InFlightRequest) -> bool {
        let mut entries = self.entries();
        match entries.iter().position(|r| r.id == request.id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Cancel every tracked request. Returns how many handles were fired.
    pub fn cancel_all(&self) -> usize {
        let fired = self.cancel_matching(|_| true);
        debug!(event = "core.registry.cancel_all", count = fired);
        fired
    }

    /// Cancel every request whose group differs from `keep`.
    ///
    /// Navigation calls this with [`RequestGroup::Global`].
    pub fn cancel_group(&self, keep: &RequestGroup) -> usize {
        let fired = self.cancel_matching(|r| r.group != *keep);
        debug!(
            event = "core.registry.cancel_group",
            keep = %keep,
            count = fired
        );
        fired
    }

    /// Cancel only the requests tagged with `group`.
    pub fn cancel_in_group(&self, group: &RequestGroup) -> usize {
        let fired = self.cancel_matching(|r| r.group == *group);
        debug!(
            event = "core.registry.cancel_in_group",
            group = %group,
            count = fired
        );
        fired
    }

    fn cancel_matching(&self, pred: impl Fn(&InFlightRequest) -> bool) -> usize {
        let snapshot: Vec<Arc<InFlightRequest>> = self
            .entries()
            .iter()
            .filter(|r| pred(r))
            .cloned()
            .collect();

        for request in snapshot.iter().rev() {
            request.cancel();
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
