use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// When the next fetch runs after a cycle settles.
pub enum IntervalPolicy<T> {
    /// Fetch once; afterwards only on reload.
    Once,
    Fixed(Duration),
    /// Computed from the most recent successful value.
    Dynamic(Arc<dyn Fn(&T) -> Duration + Send + Sync>),
    /// Long-poll: refetch as soon as the previous fetch resolves.
    Immediate,
}

impl<T> IntervalPolicy<T> {
    pub fn dynamic(f: impl Fn(&T) -> Duration + Send + Sync + 'static) -> Self {
        IntervalPolicy::Dynamic(Arc::new(f))
    }

    /// Delay before the next fetch, or `None` to wait for a reload.
    ///
    /// A dynamic policy with no value yet, and a long-poll after a failure,
    /// fall back to `error_backoff`.
    pub(crate) fn next_delay(
        &self,
        latest: Option<&T>,
        failed: bool,
        error_backoff: Duration,
    ) -> Option<Duration> {
        match self {
            IntervalPolicy::Once => None,
            IntervalPolicy::Fixed(delay) => Some(*delay),
            IntervalPolicy::Dynamic(f) => Some(latest.map_or(error_backoff, |value| f(value))),
            IntervalPolicy::Immediate if failed => Some(error_backoff),
            IntervalPolicy::Immediate => Some(Duration::ZERO),
        }
    }
}

impl<T> Clone for IntervalPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            IntervalPolicy::Once => IntervalPolicy::Once,
            IntervalPolicy::Fixed(delay) => IntervalPolicy::Fixed(*delay),
            IntervalPolicy::Dynamic(f) => IntervalPolicy::Dynamic(Arc::clone(f)),
            IntervalPolicy::Immediate => IntervalPolicy::Immediate,
        }
    }
}

impl<T> fmt::Debug for IntervalPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalPolicy::Once => f.write_str("Once"),
            IntervalPolicy::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            IntervalPolicy::Dynamic(_) => f.write_str("Dynamic(..)"),
            IntervalPolicy::Immediate => f.write_str("Immediate"),
        }
    }
}

impl<T> From<Duration> for IntervalPolicy<T> {
    fn from(delay: Duration) -> Self {
        IntervalPolicy::Fixed(delay)
    }
}
