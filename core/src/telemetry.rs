// Structured logging setup

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with an env-filterable fmt layer.
/// `RUST_LOG` wins over the configured level. Safe to call more than once;
/// later calls are no-ops, so tests can initialize freely.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer = fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        assert!(init_logging("info").is_ok());
        assert!(init_logging("debug").is_ok());
    }

    #[test]
    fn test_init_logging_rejects_bad_filter() {
        // An invalid directive still yields a usable subscriber via the
        // default env lookup path only when RUST_LOG is set; otherwise the
        // parse error surfaces.
        let result = init_logging("cadence_core=notalevel");
        if std::env::var("RUST_LOG").is_err() {
            assert!(result.is_err());
        }
    }
}
