use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Centralized path construction for the `~/.pulse/` directory layout.
///
/// Use `resolve()` in production code and `from_dir()` in tests.
#[derive(Debug, Clone)]
pub struct PulsePaths {
    pulse_dir: PathBuf,
}

impl PulsePaths {
    /// Resolve paths from the user's home directory (`~/.pulse`).
    pub fn resolve() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(Self {
            pulse_dir: home.join(".pulse"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(pulse_dir: PathBuf) -> Self {
        Self { pulse_dir }
    }

    pub fn pulse_dir(&self) -> &Path {
        &self.pulse_dir
    }

    pub fn user_config(&self) -> PathBuf {
        self.pulse_dir.join("config.toml")
    }

    /// Project-level config lives next to the working tree, not under `~/.pulse`.
    pub fn project_config(project_root: &Path) -> PathBuf {
        project_root.join(".pulse").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dir() {
        let paths = PulsePaths::from_dir(PathBuf::from("/tmp/test-pulse"));
        assert_eq!(paths.pulse_dir(), Path::new("/tmp/test-pulse"));
    }

    #[test]
    fn test_user_config() {
        let paths = PulsePaths::from_dir(PathBuf::from("/home/user/.pulse"));
        assert_eq!(
            paths.user_config(),
            PathBuf::from("/home/user/.pulse/config.toml")
        );
    }

    #[test]
    fn test_project_config() {
        assert_eq!(
            PulsePaths::project_config(Path::new("/work/cluster-ops")),
            PathBuf::from("/work/cluster-ops/.pulse/config.toml")
        );
    }

    #[test]
    fn test_resolve_uses_home() {
        temp_env::with_var("HOME", Some("/home/ops"), || {
            let paths = PulsePaths::resolve().unwrap();
            assert_eq!(paths.pulse_dir(), Path::new("/home/ops/.pulse"));
        });
    }
}
