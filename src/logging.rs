//! Tracing subscriber setup
//!
//! Installs a `tracing_subscriber::fmt` subscriber filtered by `RUST_LOG` when
//! set, falling back to the configured level otherwise.
//!
//! ```no_run
//! use pressure_grid::{config::GridConfig, logging};
//!
//! let config = GridConfig::load()?;
//! logging::init(&config.log_level)?;
//! # Ok::<(), pressure_grid::GridError>(())
//! ```

use tracing_subscriber::EnvFilter;

use crate::error::{GridError, GridResult};

/// Install the global subscriber.
///
/// `default_level` is either a bare level (`"debug"`) or any `EnvFilter`
/// directive string. Fails if a global subscriber is already installed.
pub fn init(default_level: &str) -> GridResult<()> {
    let filter = filter(default_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| GridError::Logging(e.to_string()))
}

fn filter(default_level: &str) -> GridResult<EnvFilter> {
    let fallback = EnvFilter::builder()
        .parse(default_level)
        .map_err(|e| GridError::Logging(format!("invalid filter '{default_level}': {e}")))?;

    Ok(EnvFilter::try_from_default_env().unwrap_or(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_directive() {
        assert!(matches!(filter("pressure_grid=notalevel"), Err(GridError::Logging(_))));
    }
}
