//! Configuration management.
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file, and `METAKV_*` environment variables.
//!
//! ```toml
//! database_path = "/var/lib/app/meta.db"
//! table_name = "_metakv"
//! gc_schedule = "*/5 * * * *"   # "off" disables scheduled sweeps
//!
//! [logging]
//! format = "json"
//! filter = "metakv=debug"
//! ```

use crate::gc::GcSchedule;
use crate::storage::DEFAULT_TABLE_NAME;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default sweep schedule: every minute, at second zero.
pub const DEFAULT_GC_SCHEDULE: &str = "0 * * * * *";

/// Environment variable overriding the database path.
pub const ENV_DATABASE_PATH: &str = "METAKV_DATABASE_PATH";
/// Environment variable overriding the table name.
pub const ENV_TABLE: &str = "METAKV_TABLE";
/// Environment variable overriding the sweep schedule.
pub const ENV_GC_SCHEDULE: &str = "METAKV_GC_SCHEDULE";
/// Environment variable overriding the log format.
pub const ENV_LOG_FORMAT: &str = "METAKV_LOG_FORMAT";

/// Main configuration for metakv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaKvConfig {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// Backing table name.
    pub table_name: String,
    /// Cron expression for scheduled sweeps; `None` disables them.
    pub gc_schedule: Option<String>,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directives, e.g. `metakv=debug`.
    pub filter: Option<String>,
    /// Log file path; stderr when unset.
    pub file: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database path.
    pub database_path: Option<String>,
    /// Table name.
    pub table_name: Option<String>,
    /// Sweep schedule; `""` or `"off"` disables it.
    pub gc_schedule: Option<String>,
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
}

impl Default for MetaKvConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            gc_schedule: Some(DEFAULT_GC_SCHEDULE.to_string()),
            logging: LoggingSettings::default(),
        }
    }
}

/// `<data_dir>/metakv/metakv.db`, or `./metakv.db` without a home directory.
fn default_database_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("metakv.db"),
        |dirs| dirs.data_dir().join("metakv").join("metakv.db"),
    )
}

/// `""` and `"off"` disable scheduled sweeps.
fn schedule_setting(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("off") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl MetaKvConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads `<config_dir>/metakv/config.toml`, falling back to defaults.
    ///
    /// A file that exists but fails to parse is logged and ignored.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs.config_dir().join("metakv").join("config.toml");
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Converts a `ConfigFile` to `MetaKvConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(path) = file.database_path {
            config.database_path = PathBuf::from(path);
        }
        if let Some(table_name) = file.table_name {
            config.table_name = table_name;
        }
        if let Some(schedule) = file.gc_schedule {
            config.gc_schedule = schedule_setting(schedule);
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Applies `METAKV_*` environment variables on top of the current values.
    #[must_use]
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable source.
    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = var(ENV_DATABASE_PATH).filter(|p| !p.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(table) = var(ENV_TABLE).filter(|t| !t.is_empty()) {
            self.table_name = table;
        }
        if let Some(schedule) = var(ENV_GC_SCHEDULE) {
            self.gc_schedule = schedule_setting(schedule);
        }
        if let Some(format) = var(ENV_LOG_FORMAT).filter(|f| !f.is_empty()) {
            self.logging.format = Some(format);
        }
        self
    }

    /// Parses the configured sweep schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the expression does not parse.
    pub fn parsed_gc_schedule(&self) -> Result<Option<GcSchedule>> {
        self.gc_schedule.as_deref().map(GcSchedule::parse).transpose()
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Sets the sweep schedule; `None` disables scheduled sweeps.
    #[must_use]
    pub fn with_gc_schedule(mut self, schedule: Option<impl Into<String>>) -> Self {
        self.gc_schedule = schedule.map(Into::into);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = MetaKvConfig::default();
        assert_eq!(config.table_name, "_metakv");
        assert_eq!(config.gc_schedule.as_deref(), Some(DEFAULT_GC_SCHEDULE));
        assert!(config.database_path.ends_with("metakv.db"));
        assert!(config.parsed_gc_schedule().unwrap().is_some());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/meta.db"
table_name = "settings"
gc_schedule = "*/5 * * * *"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = MetaKvConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/meta.db"));
        assert_eq!(config.table_name, "settings");
        assert_eq!(config.gc_schedule.as_deref(), Some("*/5 * * * *"));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "table_name = \"only_this\"").unwrap();

        let config = MetaKvConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.table_name, "only_this");
        assert_eq!(config.gc_schedule.as_deref(), Some(DEFAULT_GC_SCHEDULE));
    }

    #[test]
    fn test_load_from_file_errors() {
        let missing = MetaKvConfig::load_from_file(Path::new("/nonexistent/metakv.toml"));
        assert!(matches!(missing, Err(Error::OperationFailed { ref operation, .. }) if operation == "read_config_file"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "table_name = [").unwrap();
        let bad = MetaKvConfig::load_from_file(file.path());
        assert!(matches!(bad, Err(Error::OperationFailed { ref operation, .. }) if operation == "parse_config_file"));
    }

    #[test_case("" ; "empty")]
    #[test_case("off" ; "off")]
    #[test_case("OFF" ; "uppercase off")]
    #[test_case("  " ; "blank")]
    fn test_schedule_can_be_disabled(value: &str) {
        assert_eq!(schedule_setting(value.to_string()), None);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_PATH, "/data/x.db"),
            (ENV_TABLE, "kv"),
            (ENV_GC_SCHEDULE, "off"),
            (ENV_LOG_FORMAT, "json"),
        ]);
        let config = MetaKvConfig::default()
            .apply_overrides(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.database_path, PathBuf::from("/data/x.db"));
        assert_eq!(config.table_name, "kv");
        assert_eq!(config.gc_schedule, None);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert!(config.parsed_gc_schedule().unwrap().is_none());
    }

    #[test]
    fn test_invalid_schedule_is_reported() {
        let config = MetaKvConfig::default().with_gc_schedule(Some("nope"));
        assert!(matches!(
            config.parsed_gc_schedule(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = MetaKvConfig::new()
            .with_database_path("/tmp/a.db")
            .with_table_name("t")
            .with_gc_schedule(None::<String>);
        assert_eq!(config.database_path, PathBuf::from("/tmp/a.db"));
        assert_eq!(config.table_name, "t");
        assert_eq!(config.gc_schedule, None);
    }
}
