//! `tracing` subscriber setup.
//!
//! Logs go to stderr so `aqa ask` / `aqa classify` keep stdout for JSON.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `log_level` overrides `RUST_LOG`; both default to `info`.
pub fn init_logging(log_level: Option<&str>) -> Result<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = log_level.unwrap_or(&default_level);

    let env_filter =
        EnvFilter::try_new(filter).map_err(|e| anyhow!("invalid log filter '{}': {}", filter, e))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(use_color());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {}", e))?;

    Ok(())
}

fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && atty::is(atty::Stream::Stderr)
}
