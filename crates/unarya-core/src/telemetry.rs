//! Tracing initialisation shared by `unaryad` and the `unarya` CLI.
//!
//! Filtering comes from `UNARYA_LOG`, then `RUST_LOG`, then the level passed
//! in. Setting `UNARYA_LOG_FORMAT=json` switches any binary to JSON lines
//! without a flag. Only the first initialisation in a process takes effect.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Env var holding a filter directive for Unarya binaries.
pub const LOG_ENV: &str = "UNARYA_LOG";

/// Env var selecting the output format (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "UNARYA_LOG_FORMAT";

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Whether the environment asks for JSON output.
pub fn json_requested() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Install the global subscriber.
///
/// `json` forces JSON lines; otherwise [`LOG_FORMAT_ENV`] decides.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    if json || json_requested() {
        registry
            .with(fmt::layer().with_target(false).json().flatten_event(true))
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}
