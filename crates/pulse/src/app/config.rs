use clap::{Arg, ArgAction, Command};

pub fn config_command() -> Command {
    Command::new("config")
        .about("Show the effective configuration")
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output as JSON")
                .action(ArgAction::SetTrue),
        )
}
