//! Configuration type definitions for pulse.
//!
//! All fields are `Option<T>` so the config hierarchy can merge: only
//! explicitly-set values override lower-priority configs. Accessors supply
//! the built-in defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [http]
//! base_url = "http://127.0.0.1:8091"
//! username = "Administrator"
//! request_timeout_ms = 30000
//!
//! [poll]
//! interval_ms = 3000
//!
//! [connection]
//! countdown_secs = 60
//! hard_reload = true
//!
//! [actions]
//! cooldown_secs = 10
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Main configuration loaded from TOML config files.
///
/// Loaded from (later overrides earlier):
/// 1. User config: `~/.pulse/config.toml`
/// 2. Project config: `./.pulse/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub actions: ActionsConfig,
}

/// Cluster endpoint and request defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the cluster REST API.
    /// Default: "http://127.0.0.1:8091"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-request timeout. Requests exceeding it are cancelled with reason `timeout`.
    /// Default: none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl HttpConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(defaults::DEFAULT_BASE_URL)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            base_url: override_config
                .base_url
                .clone()
                .or_else(|| base.base_url.clone()),
            request_timeout_ms: override_config
                .request_timeout_ms
                .or(base.request_timeout_ms),
            username: override_config
                .username
                .clone()
                .or_else(|| base.username.clone()),
            password: override_config
                .password
                .clone()
                .or_else(|| base.password.clone()),
        }
    }
}

/// Poller scheduling defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between fetches for pollers with a fixed interval.
    /// Default: 3000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    /// Delay before retrying after a failed cycle when the interval policy
    /// has no value to derive one from.
    /// Default: 5000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_backoff_ms: Option<u64>,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(
            self.interval_ms
                .unwrap_or(defaults::DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(
            self.error_backoff_ms
                .unwrap_or(defaults::DEFAULT_ERROR_BACKOFF_MS),
        )
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            interval_ms: override_config.interval_ms.or(base.interval_ms),
            error_backoff_ms: override_config.error_backoff_ms.or(base.error_backoff_ms),
        }
    }
}

/// Lost-connection banner and recovery behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Seconds shown on the banner before an automatic recovery attempt.
    /// Default: 60
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown_secs: Option<u32>,

    /// Whether a confirmed recovery forces a full application reload.
    /// When false the monitor returns to its normal state instead.
    /// Default: true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_reload: Option<bool>,
}

impl ConnectionConfig {
    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
            .unwrap_or(defaults::DEFAULT_COUNTDOWN_SECS)
    }

    pub fn hard_reload(&self) -> bool {
        self.hard_reload.unwrap_or(true)
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            countdown_secs: override_config.countdown_secs.or(base.countdown_secs),
            hard_reload: override_config.hard_reload.or(base.hard_reload),
        }
    }
}

/// Fire-and-forget action guard (compaction triggers and similar).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Default: 10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,

    /// Default: 2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,
}

impl ActionsConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(
            self.cooldown_secs
                .unwrap_or(defaults::DEFAULT_ACTION_COOLDOWN_SECS),
        )
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.sweep_interval_secs
                .unwrap_or(defaults::DEFAULT_SWEEP_INTERVAL_SECS),
        )
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            cooldown_secs: override_config.cooldown_secs.or(base.cooldown_secs),
            sweep_interval_secs: override_config
                .sweep_interval_secs
                .or(base.sweep_interval_secs),
        }
    }
}
