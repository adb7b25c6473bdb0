//! Tracing subscriber installation.
//!
//! # Design
//! - One entry point installs the global subscriber for every Kiln binary.
//! - Thread names are always recorded so build-worker output is attributable.
//! - The build SHA is stored once and reported by [`build_sha`].

use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Level filter applied when neither `RUST_LOG` nor configuration provides one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level` when set.
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
    };
    tracing_subscriber::registry()
        .with(output)
        .with(env_filter(config.level))
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    let _ = BUILD_SHA.set(config.build_sha.to_string());
    info!(
        build_sha = config.build_sha,
        format = config.format.as_str(),
        "logging initialised"
    );
    Ok(())
}

/// Build identifier recorded by [`init_logging`], or `dev` before it ran.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Level filter (e.g., `info`, `kiln_fsops=debug`).
    pub level: &'a str,
    /// Output format.
    pub format: LogFormat,
    /// Build identifier logged at startup.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a format name; unknown names fall back to [`LogFormat::infer`].
    #[must_use]
    pub fn from_name(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "text" => Self::Pretty,
            _ => Self::infer(),
        }
    }

    /// Name accepted by [`LogFormat::from_name`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip_and_fall_back() {
        for format in [LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(LogFormat::from_name(format.as_str()), format);
        }
        assert_eq!(LogFormat::from_name(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::from_name("text"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_name("xml"), LogFormat::infer());
    }

    #[test]
    fn subscriber_installs_once_and_records_the_sha() {
        let config = LoggingConfig {
            level: "not a [valid filter",
            format: LogFormat::Pretty,
            build_sha: "abc123",
        };
        let first = init_logging(&config);
        assert!(init_logging(&config).is_err());
        if first.is_ok() {
            assert_eq!(build_sha(), "abc123");
        }
    }
}
