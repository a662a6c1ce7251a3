use clap::ArgMatches;
use tracing::error;

mod compact;
mod config;
mod helpers;
mod watch;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match matches.subcommand() {
        Some(("watch", sub_matches)) => watch::handle_watch_command(sub_matches),
        Some(("compact", sub_matches)) => compact::handle_compact_command(sub_matches),
        Some(("config", sub_matches)) => config::handle_config_command(sub_matches),
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    }
}
