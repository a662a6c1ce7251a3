use clap::{Arg, ArgAction, Command};

pub fn watch_command() -> Command {
    Command::new("watch")
        .about("Poll an endpoint and print changes until interrupted")
        .long_about(
            "Polls PATH on the cluster and prints a line whenever the response changes. \
             If the cluster becomes unreachable a countdown banner is shown and the \
             request is retried automatically; once it answers again the watcher \
             reinitializes.",
        )
        .arg(
            Arg::new("path")
                .help("REST path to poll")
                .default_value("/pools/default")
                .index(1),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .help("Delay between polls in milliseconds (overrides config)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("long-poll")
                .long("long-poll")
                .help("Use etag long-polling instead of a fixed interval")
                .action(ArgAction::SetTrue)
                .conflicts_with("interval-ms"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Fetch once and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print raw JSON bodies instead of summaries")
                .action(ArgAction::SetTrue),
        )
}
