use clap::{Arg, ArgAction, Command};

pub fn compact_command() -> Command {
    Command::new("compact")
        .about("Trigger bucket compaction")
        .long_about(
            "Starts compaction for each named bucket. Repeating a bucket within the \
             cooldown window is skipped instead of sending a second request.",
        )
        .arg(
            Arg::new("bucket")
                .help("Bucket names to compact")
                .required(true)
                .num_args(1..)
                .action(ArgAction::Append)
                .index(1),
        )
}
