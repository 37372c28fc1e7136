//! Log output setup.
//!
//! Plain `tracing` to stderr through the fmt layer. The filter comes from the
//! merged configuration, where `RUST_LOG` has already been folded in.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Call once, before anything logs.
pub fn init(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log filter '{}'", log_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_filter() {
        assert!(init("tunesmith=loudest").is_err());
    }
}
