//! # pulse-config
//!
//! TOML configuration types, loading, and validation for pulse.
//!
//! Single source of truth for `PulseConfig` and the `~/.pulse/` layout.

mod defaults;
mod loading;
mod validation;

pub mod errors;
pub mod paths;
pub mod types;

// Public API re-exports
pub use errors::ConfigError;
pub use loading::{load_config_file, load_hierarchy_from, merge_configs};
pub use paths::PulsePaths;
pub use types::{ActionsConfig, ConnectionConfig, HttpConfig, PollConfig, PulseConfig};
pub use validation::{MAX_INTERVAL_MS, MAX_PERIOD_SECS, MIN_INTERVAL_MS, validate_config};

impl PulseConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
