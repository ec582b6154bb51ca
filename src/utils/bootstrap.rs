//! Bootstrap utilities for the chibi binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogLevel, LOG_ENV_VAR};

/// Initialize tracing.
///
/// `CHIBI_LOG` takes precedence; otherwise the configured level applies.
pub fn init_tracing(level: LogLevel) {
    tracing_subscriber::registry()
        .with(log_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_log_filter_falls_back_to_configured_level() {
        std::env::remove_var(LOG_ENV_VAR);
        assert_eq!(log_filter(LogLevel::Warning).to_string(), "warn");
    }

    #[test]
    #[serial]
    fn test_log_env_overrides_configured_level() {
        std::env::set_var(LOG_ENV_VAR, "chibi=debug");
        let filter = log_filter(LogLevel::Error);
        std::env::remove_var(LOG_ENV_VAR);
        assert_eq!(filter.to_string(), "chibi=debug");
    }
}
