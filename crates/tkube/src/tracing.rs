//! Tracing configuration for the tkube CLI.
//!
//! Logs go to stderr so rendered command output on stdout stays clean.
//! `RUST_LOG` wins over the level chosen by flags.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown by the default filter.
const CRATES: &[&str] = &["tkube", "tkube_core", "tkube_session", "tkube_tools_tsh"];

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Level applied to the tkube crates when `RUST_LOG` is unset
    pub level: Level,
    /// Explicit filter directives, overriding `RUST_LOG` and `level`
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Configuration selected by the global CLI flags.
    #[must_use]
    pub fn from_flags(verbose: bool, json: bool) -> Self {
        Self {
            format: if json {
                TracingFormat::Json
            } else {
                TracingFormat::Compact
            },
            level: if verbose { Level::DEBUG } else { Level::WARN },
            filter: None,
        }
    }
}

/// Filter directives enabling `level` for the tkube crates.
#[must_use]
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize tracing with the given configuration
///
/// # Errors
///
/// Returns an error if the filter directives are invalid.
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directives(config.level)))
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false);

            registry.with(layer).init();
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);

            registry.with(layer).init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let config = TracingConfig::from_flags(false, false);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.level, Level::WARN);

        let config = TracingConfig::from_flags(true, true);
        assert_eq!(config.format, TracingFormat::Json);
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_default_directives_parse() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("tkube=debug,"));
        assert!(directives.contains("tkube_tools_tsh=debug"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
