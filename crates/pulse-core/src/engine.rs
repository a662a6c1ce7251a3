//! Composition root.
//!
//! Owns the registry, connection monitor, action tracker, and event bus, and
//! hands out scoped views and pollers wired to them.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use pulse_config::PulseConfig;

use crate::client::RequestClient;
use crate::connection::{ConnectionMonitor, MonitorSettings, Recovery};
use crate::debounce::ActionTracker;
use crate::errors::{EngineError, FetchError};
use crate::events::EventBus;
use crate::poller::Poller;
use crate::registry::PendingRequests;
use crate::scope::Scope;
use crate::transport::{RequestGroup, Transport};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub monitor: MonitorSettings,
    pub request_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub action_cooldown: Duration,
    pub sweep_interval: Duration,
}

impl From<&PulseConfig> for EngineSettings {
    fn from(config: &PulseConfig) -> Self {
        Self {
            monitor: MonitorSettings::from(config),
            request_timeout: config.http.request_timeout(),
            poll_interval: config.poll.interval(),
            error_backoff: config.poll.error_backoff(),
            action_cooldown: config.actions.cooldown(),
            sweep_interval: config.actions.sweep_interval(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&PulseConfig::default())
    }
}

pub struct Engine {
    settings: EngineSettings,
    registry: Arc<PendingRequests>,
    monitor: Arc<ConnectionMonitor>,
    actions: Arc<ActionTracker>,
    client: RequestClient,
    events: EventBus,
    root: Scope,
    sweeper: JoinHandle<()>,
    next_view: AtomicU64,
}

impl Engine {
    /// Build an engine and start the action sweeper. Must be called inside a
    /// tokio runtime.
    pub fn new(settings: EngineSettings, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(PendingRequests::new());
        let monitor = ConnectionMonitor::new(settings.monitor.clone());
        let client = RequestClient::new(transport, Arc::clone(&registry), Arc::clone(&monitor))
            .with_default_timeout(settings.request_timeout);
        let actions = Arc::new(ActionTracker::new(settings.action_cooldown));
        let root = Scope::root("app");
        let sweeper = actions.spawn_sweeper(settings.sweep_interval, root.token());

        info!(
            event = "core.engine.started",
            poll_interval_ms = settings.poll_interval.as_millis() as u64,
            countdown_secs = settings.monitor.countdown_secs,
            hard_reload = settings.monitor.hard_reload
        );

        Self {
            settings,
            registry,
            monitor,
            actions,
            client,
            events: EventBus::new(),
            root,
            sweeper,
            next_view: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &PulseConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(EngineSettings::from(config), transport)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub fn registry(&self) -> &Arc<PendingRequests> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    pub fn actions(&self) -> &Arc<ActionTracker> {
        &self.actions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn root_scope(&self) -> &Scope {
        &self.root
    }

    pub fn set_recovery(&self, recovery: Arc<dyn Recovery>) {
        self.monitor.set_recovery(recovery);
    }

    /// Open a view scope. Tearing it down cancels the requests tagged with
    /// the view's group.
    ///
    /// Every view gets its own group, so two live views of one section never
    /// cancel each other's requests.
    pub fn view(&self, section: &str) -> Result<Scope, EngineError> {
        if !self.root.is_alive() {
            return Err(EngineError::ShutDown);
        }
        let instance = self.next_view.fetch_add(1, Ordering::Relaxed);
        let group = RequestGroup::view(format!("{}#{}", section, instance));
        let scope = self.root.child(section, group.clone());

        let registry = Arc::clone(&self.registry);
        let name = section.to_string();
        scope.on_teardown(move || {
            let cancelled = registry.cancel_in_group(&group);
            debug!(event = "core.engine.view_closed", view = %name, cancelled = cancelled);
        });
        Ok(scope)
    }

    /// A poller owned by `scope` using the configured error backoff.
    pub fn poller<T, F, Fut>(&self, scope: &Scope, fetch: F) -> Poller<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let poller = Poller::new(scope, fetch);
        poller.set_error_backoff(self.settings.error_backoff);
        poller
    }

    /// Move between dotted section names such as `app.admin.buckets`.
    ///
    /// Refused while the lost-connection banner is up. Leaving for a section
    /// that is neither an ancestor nor a descendant cancels every request
    /// outside the global group.
    pub fn navigate(&self, from: &str, to: &str) -> Result<(), EngineError> {
        if !self.monitor.allows_navigation() {
            return Err(EngineError::NavigationBlocked);
        }
        if !is_related_section(from, to) {
            let cancelled = self.registry.cancel_group(&RequestGroup::Global);
            debug!(
                event = "core.engine.navigate_cancelled",
                from = from,
                to = to,
                cancelled = cancelled
            );
        }
        Ok(())
    }

    /// Logout: cancel every request and tear down every scope.
    pub fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        self.root.teardown();
        self.monitor.shutdown();
        info!(event = "core.engine.shutdown", cancelled = cancelled);
    }

    pub fn is_shut_down(&self) -> bool {
        !self.root.is_alive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.root.teardown();
        self.sweeper.abort();
    }
}

fn is_ancestor_section(ancestor: &str, section: &str) -> bool {
    section == ancestor
        || section
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn is_related_section(from: &str, to: &str) -> bool {
    is_ancestor_section(from, to) || is_ancestor_section(to, from)
}
