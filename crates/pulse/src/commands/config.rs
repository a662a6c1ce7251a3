use clap::ArgMatches;
use serde::Serialize;
use tracing::info;

use pulse_config::PulseConfig;

use super::helpers;

/// Fully resolved settings, defaults filled in.
#[derive(Serialize)]
struct EffectiveConfig {
    http: EffectiveHttp,
    poll: EffectivePoll,
    connection: EffectiveConnection,
    actions: EffectiveActions,
}

#[derive(Serialize)]
struct EffectiveHttp {
    base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

#[derive(Serialize)]
struct EffectivePoll {
    interval_ms: u64,
    error_backoff_ms: u64,
}

#[derive(Serialize)]
struct EffectiveConnection {
    countdown_secs: u32,
    hard_reload: bool,
}

#[derive(Serialize)]
struct EffectiveActions {
    cooldown_secs: u64,
    sweep_interval_secs: u64,
}

impl From<&PulseConfig> for EffectiveConfig {
    fn from(config: &PulseConfig) -> Self {
        Self {
            http: EffectiveHttp {
                base_url: config.http.base_url().to_string(),
                request_timeout_ms: config.http.request_timeout_ms,
                username: config.http.username.clone(),
                password: config.http.password.as_ref().map(|_| "********".to_string()),
            },
            poll: EffectivePoll {
                interval_ms: config.poll.interval().as_millis() as u64,
                error_backoff_ms: config.poll.error_backoff().as_millis() as u64,
            },
            connection: EffectiveConnection {
                countdown_secs: config.connection.countdown_secs(),
                hard_reload: config.connection.hard_reload(),
            },
            actions: EffectiveActions {
                cooldown_secs: config.actions.cooldown().as_secs(),
                sweep_interval_secs: config.actions.sweep_interval().as_secs(),
            },
        }
    }
}

pub(crate) fn handle_config_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    info!(event = "cli.config.show_started", json_output = json_output);

    let config = helpers::resolve_config(matches)?;
    let effective = EffectiveConfig::from(&config);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
    } else {
        print!("{}", toml::to_string_pretty(&effective)?);
    }

    info!(event = "cli.config.show_completed");
    Ok(())
}
