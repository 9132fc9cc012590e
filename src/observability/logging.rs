//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor settings provide one.
pub const DEFAULT_FILTER: &str = "metakv=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything other than `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Event filter.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_settings(None)
    }
}

impl LoggingConfig {
    /// Builds the configuration from file settings.
    ///
    /// `RUST_LOG` wins over the configured filter.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>) -> Self {
        let configured = settings
            .and_then(|s| s.filter.as_deref())
            .unwrap_or(DEFAULT_FILTER);
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(configured))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        Self {
            filter,
            format: settings
                .and_then(|s| s.format.as_deref())
                .map(LogFormat::parse)
                .unwrap_or_default(),
            file: settings.and_then(|s| s.file.as_ref()).map(PathBuf::from),
        }
    }
}
