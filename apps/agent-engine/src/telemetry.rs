//! Tracing setup.
//!
//! `RUST_LOG` always wins; otherwise the configured level applies to every
//! target, with `agent_engine` raised to at least `info`.
//!
//! ```rust,ignore
//! use agent_engine::telemetry::init_tracing;
//!
//! init_tracing(&config.logging)?;
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::{LogFormat, LoggingSettings};

/// Error raised when a global subscriber is already installed.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Build the filter directive used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(level: &str) -> String {
    match level {
        "trace" | "debug" | "info" => format!("{level},agent_engine={level}"),
        _ => format!("{level},agent_engine=info"),
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing(settings: &LoggingSettings) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&settings.level)));

    let span_events = if settings.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_span_events(span_events)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_span_events(span_events)
            .with_target(true)
            .try_init(),
    };

    result.map_err(|e| TelemetryError(e.to_string()))?;
    tracing::debug!(format = ?settings.format, level = %settings.level, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_keeps_crate_visible() {
        assert_eq!(default_directive("warn"), "warn,agent_engine=info");
        assert_eq!(default_directive("debug"), "debug,agent_engine=debug");
    }
}
