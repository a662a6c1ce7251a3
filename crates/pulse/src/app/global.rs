use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("pulse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Watch a cluster admin API and survive connection loss")
        .long_about(
            "pulse polls a cluster's REST admin API and tracks in-flight requests. \
             When the cluster stops answering it shows a lost-connection countdown \
             and retries automatically.",
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .help("Cluster REST API base URL (overrides config)")
                .global(true),
        )
        .arg(
            Arg::new("username")
                .short('u')
                .long("username")
                .help("Username for HTTP basic auth (overrides config)")
                .global(true),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .help("Password for HTTP basic auth (overrides config)")
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
