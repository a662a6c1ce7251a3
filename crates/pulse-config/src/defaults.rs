pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8091";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 5_000;

pub const DEFAULT_COUNTDOWN_SECS: u32 = 60;

pub const DEFAULT_ACTION_COOLDOWN_SECS: u64 = 10;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 2;
