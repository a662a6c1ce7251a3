//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.pulse/config.toml` (global user preferences)
//! 3. **Project config** - `./.pulse/config.toml` (project-specific overrides)
//! 4. **CLI arguments** - Command-line flags (highest priority, applied by the CLI)

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::ConfigError;
use crate::paths::PulsePaths;
use crate::types::{ActionsConfig, ConnectionConfig, HttpConfig, PollConfig, PulseConfig};
use crate::validation::validate_config;

/// Load configuration from the user and project config files.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be parsed, or if the
/// merged configuration fails validation. Missing config files are not errors.
pub fn load_hierarchy() -> Result<PulseConfig, ConfigError> {
    let paths = PulsePaths::resolve()?;
    let project_root = std::env::current_dir()?;
    load_hierarchy_from(&paths, &project_root)
}

/// Same as [`load_hierarchy`] with explicit locations. Used by tests.
pub fn load_hierarchy_from(
    paths: &PulsePaths,
    project_root: &Path,
) -> Result<PulseConfig, ConfigError> {
    let mut config = PulseConfig::default();

    for path in [
        paths.user_config(),
        PulsePaths::project_config(project_root),
    ] {
        match load_config_file(&path) {
            Ok(layer) => {
                debug!(event = "config.loading.layer_applied", path = %path.display());
                config = merge_configs(config, layer);
            }
            Err(e) if e.is_file_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    validate_config(&config)?;

    Ok(config)
}

/// Load a single configuration file.
pub fn load_config_file(path: &Path) -> Result<PulseConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Merge two configurations, with `override_config` taking precedence for
/// every field it sets.
pub fn merge_configs(base: PulseConfig, override_config: PulseConfig) -> PulseConfig {
    PulseConfig {
        http: HttpConfig::merge(&base.http, &override_config.http),
        poll: PollConfig::merge(&base.poll, &override_config.poll),
        connection: ConnectionConfig::merge(&base.connection, &override_config.connection),
        actions: ActionsConfig::merge(&base.actions, &override_config.actions),
    }
}
