mod actions;
mod config;
mod global;
mod watch;

#[cfg(test)]
mod tests;

use clap::Command;

pub fn build_cli() -> Command {
    global::root_command()
        .subcommand(watch::watch_command())
        .subcommand(actions::compact_command())
        .subcommand(config::config_command())
}
