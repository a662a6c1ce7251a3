use std::error::Error;
use std::fmt;

/// Base trait for all engine errors
pub trait PulseError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Why a request was aborted on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Navigation, logout, or an explicit cancel through the registry.
    Cancelled,
    /// The per-request timeout elapsed.
    Timeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled"),
            CancelReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Outcome of a failed fetch.
///
/// The three classes matter to different parties: cancellations are silent,
/// application errors go to the subscriber only, connectivity errors also
/// drive the connection-loss monitor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request {reason}")]
    Cancelled { reason: CancelReason },

    #[error("server returned HTTP {status}")]
    Application {
        status: u16,
        body: serde_json::Value,
    },

    #[error("connection failed: {message}")]
    Connectivity { message: String },

    #[error("unexpected response payload: {message}")]
    Decode { message: String },
}

impl FetchError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        FetchError::Connectivity {
            message: message.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, FetchError::Connectivity { .. })
    }

    /// HTTP status, when the server produced a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl PulseError for FetchError {
    fn error_code(&self) -> &'static str {
        match self {
            FetchError::Cancelled {
                reason: CancelReason::Cancelled,
            } => "REQUEST_CANCELLED",
            FetchError::Cancelled {
                reason: CancelReason::Timeout,
            } => "REQUEST_TIMEOUT",
            FetchError::Application { .. } => "APPLICATION_ERROR",
            FetchError::Connectivity { .. } => "CONNECTIVITY_ERROR",
            FetchError::Decode { .. } => "DECODE_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, FetchError::Application { status, .. } if (400..500).contains(status))
    }
}

/// Errors raised by the engine's composition root.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("navigation is blocked while the connection to the cluster is lost")]
    NavigationBlocked,

    #[error("engine has been shut down")]
    ShutDown,
}

impl PulseError for EngineError {
    fn error_code(&self) -> &'static str {
        match self {
            EngineError::NavigationBlocked => "NAVIGATION_BLOCKED",
            EngineError::ShutDown => "ENGINE_SHUT_DOWN",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, EngineError::NavigationBlocked)
    }
}
