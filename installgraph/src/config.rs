//! INI configuration file.
//!
//! Lives at `<config dir>/installgraph/config.ini`. Every key is optional;
//! missing keys keep their defaults.
//!
//! ```ini
//! [download]
//! concurrency = 16
//! timeout_secs = 30
//! retries = 2
//! source = mirror
//! directory = /home/me/.local/share/installgraph/downloads
//!
//! [executor]
//! max_concurrent_tasks = 256
//!
//! [logging]
//! level = info
//! directory = /home/me/.local/state/installgraph/logs
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::concurrency::{default_concurrency, MAX_CONCURRENCY};
use crate::download::{DownloadSource, MirrorList, DEFAULT_TIMEOUT_SECS};
use crate::executor::{ExecutorConfig, RetryPolicy, DEFAULT_MAX_CONCURRENT_TASKS, MAX_CONCURRENT_TASKS};

/// Application directory name under the platform config/data dirs.
const APP_DIR: &str = "installgraph";

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Errors from loading, validating or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("failed to write config file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Returns the default configuration file path.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.ini")
}

fn default_download_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("downloads")
}

// =============================================================================
// Sections
// =============================================================================

/// `[download]` section.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadSettings {
    /// Concurrent network transfers across all download guards.
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Retries per candidate URL after the first attempt.
    pub retries: u32,
    pub source: DownloadSource,
    pub directory: PathBuf,
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the per-candidate retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.retries.saturating_add(1))
    }

    /// Returns mirror rules for the configured source.
    pub fn mirrors(&self) -> MirrorList {
        MirrorList::new(self.source)
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
            source: DownloadSource::default(),
            directory: default_download_dir(),
        }
    }
}

/// `[executor]` section.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutorSettings {
    pub max_concurrent_tasks: usize,
}

impl ExecutorSettings {
    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default().with_max_concurrent_tasks(self.max_concurrent_tasks)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

/// `[logging]` section.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggingSettings {
    /// Default filter level; `RUST_LOG` overrides it.
    pub level: String,
    /// Directory for daily log files. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

/// The whole configuration file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigFile {
    pub download: DownloadSettings,
    pub executor: ExecutorSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads the default file, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_ini(&Ini::load_from_str(text)?)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Renders the configuration as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Renders the configuration as INI text.
    pub fn to_ini_string(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.to_ini().write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Saves to the default file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Saves to a specific file, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        self.to_ini().write_to_file(path).map_err(write_error)
    }
}

// =============================================================================
// Keys
// =============================================================================

/// A single `section.key` setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    DownloadConcurrency,
    DownloadTimeoutSecs,
    DownloadRetries,
    DownloadSource,
    DownloadDirectory,
    ExecutorMaxConcurrentTasks,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// Returns every key in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::DownloadConcurrency,
            Self::DownloadTimeoutSecs,
            Self::DownloadRetries,
            Self::DownloadSource,
            Self::DownloadDirectory,
            Self::ExecutorMaxConcurrentTasks,
            Self::LoggingLevel,
            Self::LoggingDirectory,
        ]
    }

    pub fn section(self) -> &'static str {
        match self {
            Self::DownloadConcurrency
            | Self::DownloadTimeoutSecs
            | Self::DownloadRetries
            | Self::DownloadSource
            | Self::DownloadDirectory => "download",
            Self::ExecutorMaxConcurrentTasks => "executor",
            Self::LoggingLevel | Self::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(self) -> &'static str {
        match self {
            Self::DownloadConcurrency => "concurrency",
            Self::DownloadTimeoutSecs => "timeout_secs",
            Self::DownloadRetries => "retries",
            Self::DownloadSource => "source",
            Self::DownloadDirectory | Self::LoggingDirectory => "directory",
            Self::ExecutorMaxConcurrentTasks => "max_concurrent_tasks",
            Self::LoggingLevel => "level",
        }
    }

    /// Returns `section.key`.
    pub fn name(self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Reads the value as it would be written to the file.
    pub fn get(self, config: &ConfigFile) -> String {
        match self {
            Self::DownloadConcurrency => config.download.concurrency.to_string(),
            Self::DownloadTimeoutSecs => config.download.timeout_secs.to_string(),
            Self::DownloadRetries => config.download.retries.to_string(),
            Self::DownloadSource => config.download.source.to_string(),
            Self::DownloadDirectory => config.download.directory.display().to_string(),
            Self::ExecutorMaxConcurrentTasks => config.executor.max_concurrent_tasks.to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validates and stores a value.
    pub fn set(self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            Self::DownloadConcurrency => config.download.concurrency = self.bounded(value, MAX_CONCURRENCY)?,
            Self::DownloadTimeoutSecs => config.download.timeout_secs = self.positive(value)?,
            Self::DownloadRetries => {
                config.download.retries = value.parse().map_err(|_| self.invalid(value, "expected a whole number"))?
            }
            Self::DownloadSource => {
                config.download.source = value.parse().map_err(|reason| self.invalid(value, reason))?
            }
            Self::DownloadDirectory => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.download.directory = PathBuf::from(value);
            }
            Self::ExecutorMaxConcurrentTasks => {
                config.executor.max_concurrent_tasks = self.bounded(value, MAX_CONCURRENT_TASKS)?
            }
            Self::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, format!("expected one of {}", LOG_LEVELS.join(", "))));
                }
                config.logging.level = level;
            }
            Self::LoggingDirectory => {
                config.logging.directory = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
        Ok(())
    }

    fn positive<T>(self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + From<u8>,
    {
        match value.parse::<T>() {
            Ok(n) if n >= T::from(1) => Ok(n),
            _ => Err(self.invalid(value, "expected a number of at least 1")),
        }
    }

    fn bounded(self, value: &str, max: usize) -> Result<usize, ConfigError> {
        match value.parse::<usize>() {
            Ok(n) if (1..=max).contains(&n) => Ok(n),
            _ => Err(self.invalid(value, format!("expected a number between 1 and {}", max))),
        }
    }

    fn invalid(self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ConfigFile::from_ini_str("").unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.download.retries, DEFAULT_RETRIES);
        assert_eq!(config.executor.max_concurrent_tasks, DEFAULT_MAX_CONCURRENT_TASKS);
        assert!(config.download.concurrency >= 1);
    }

    #[test]
    fn test_parse_all_sections() {
        let config = ConfigFile::from_ini_str(
            "[download]\nconcurrency = 3\ntimeout_secs=10\nretries=0\nsource = Mirror\ndirectory=/tmp/dl\n\
             [executor]\nmax_concurrent_tasks = 8\n\
             [logging]\nlevel = DEBUG\ndirectory = /tmp/logs\n",
        )
        .unwrap();

        assert_eq!(config.download.concurrency, 3);
        assert_eq!(config.download.timeout(), Duration::from_secs(10));
        assert_eq!(config.download.retry_policy().max_attempts(), 1);
        assert_eq!(config.download.source, DownloadSource::Mirror);
        assert_eq!(config.download.directory, PathBuf::from("/tmp/dl"));
        assert_eq!(config.executor.to_executor_config().max_concurrent_tasks, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn test_oversized_concurrency_is_rejected() {
        let err = ConfigFile::from_ini_str("[download]\nconcurrency = 18446744073709551615\n").unwrap_err();
        assert!(err.to_string().contains("between 1 and 1024"), "{}", err);

        let err = ConfigFile::from_ini_str("[executor]\nmax_concurrent_tasks = 65537\n").unwrap_err();
        assert!(err.to_string().contains("[executor] max_concurrent_tasks"));

        let mut config = ConfigFile::default();
        ConfigKey::DownloadConcurrency.set(&mut config, "1024").unwrap();
        assert_eq!(config.download.concurrency, MAX_CONCURRENCY);
        assert!(ConfigKey::DownloadConcurrency.set(&mut config, "1025").is_err());
        assert_eq!(config.download.concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn test_invalid_value_names_section_and_key() {
        let err = ConfigFile::from_ini_str("[download]\nconcurrency = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value '0' for [download] concurrency: expected a number between 1 and 1024"
        );

        let err = ConfigFile::from_ini_str("[logging]\nlevel = loud\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "level", .. }));

        let err = ConfigFile::from_ini_str("[download]\nsource = ftp\n").unwrap_err();
        assert!(err.to_string().contains("unknown download source"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.download.concurrency = 5;
        config.download.source = DownloadSource::Balanced;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_key_lookup() {
        let key: ConfigKey = "download.concurrency".parse().unwrap();
        assert_eq!(key, ConfigKey::DownloadConcurrency);
        assert_eq!(key.to_string(), "download.concurrency");
        assert!(matches!(
            "download.speed".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_and_clear_log_directory() {
        let mut config = ConfigFile::default();
        ConfigKey::LoggingDirectory.set(&mut config, "/var/log/ig").unwrap();
        assert_eq!(ConfigKey::LoggingDirectory.get(&config), "/var/log/ig");
        ConfigKey::LoggingDirectory.set(&mut config, "").unwrap();
        assert_eq!(config.logging.directory, None);
    }

    #[test]
    fn test_rendered_ini_mentions_every_key() {
        let text = ConfigFile::default().to_ini_string();
        assert!(text.contains("[download]"));
        assert!(text.contains("max_concurrent_tasks"));
        assert!(text.contains("[logging]"));
    }
}
