use clap::ArgMatches;
use tracing::warn;

use pulse_config::PulseConfig;

/// Load configuration with warning on errors.
///
/// Falls back to defaults if config loading fails, but notifies the user via:
/// - stderr message for immediate visibility
/// - structured log event `cli.config.load_failed` for debugging
pub fn load_config_with_warning() -> PulseConfig {
    match PulseConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Could not load config: {}. Using defaults.\n\
                 Tip: Check ~/.pulse/config.toml and ./.pulse/config.toml for syntax errors.",
                e
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                error_code = e.error_code(),
                "Config load failed, using defaults"
            );
            PulseConfig::default()
        }
    }
}

/// Config hierarchy plus the global CLI overrides, validated.
pub fn resolve_config(matches: &ArgMatches) -> Result<PulseConfig, Box<dyn std::error::Error>> {
    let mut config = load_config_with_warning();

    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.http.base_url = Some(base_url.clone());
    }
    if let Some(username) = matches.get_one::<String>("username") {
        config.http.username = Some(username.clone());
    }
    if let Some(password) = matches.get_one::<String>("password") {
        config.http.password = Some(password.clone());
    }

    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {}", e);
        return Err(e.into());
    }
    Ok(config)
}

pub fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            eprintln!("❌ Failed to start async runtime: {}", e);
            e.into()
        })
}
