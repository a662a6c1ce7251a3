//! # pulse-core
//!
//! Client-side polling and connection-resilience engine for a cluster admin
//! API: pending request tracking, periodic pollers, action cooldowns, and
//! connection-loss recovery.

pub mod client;
pub mod connection;
pub mod debounce;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod scope;
pub mod transport;

pub use client::RequestClient;
pub use connection::{
    ConnectionMonitor, ConnectionPhase, ConnectionSnapshot, MonitorSettings, Recovery,
};
pub use debounce::ActionTracker;
pub use engine::{Engine, EngineSettings};
pub use errors::{CancelReason, EngineError, FetchError, PulseError};
pub use events::EventBus;
pub use logging::init_logging;
pub use poller::{IntervalPolicy, PollSlot, PollUpdate, Poller, SpinnerFlag};
pub use registry::{InFlightRequest, PendingRequests, RequestId};
pub use scope::{Scope, TeardownId};
pub use transport::{Method, Request, RequestBody, RequestGroup, Response, Transport};
