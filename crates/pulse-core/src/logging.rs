use tracing_subscriber::EnvFilter;

/// Install the JSON log subscriber on stderr.
///
/// Quiet mode suppresses every level so stdout/stderr stay clean for piping.
/// Verbose mode honours `RUST_LOG` and falls back to `info`.
pub fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // try_init: tests and embedders may already have a subscriber installed.
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
