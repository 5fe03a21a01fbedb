//! Runtime configuration for timetrace core.
//!
//! # Responsibility
//! - Load database, logging and repository settings from the environment.
//! - Provide repository defaults (batch size, cascade mode, image path key).
//!
//! # Invariants
//! - `.env` is read at most once per process.
//! - Invalid values are rejected, never silently replaced by defaults.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_DB_PATH: &str = "TIMETRACE_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "TIMETRACE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TIMETRACE_LOG_DIR";
pub const ENV_BATCH_SIZE: &str = "TIMETRACE_BATCH_SIZE";
pub const ENV_CASCADE_MODE: &str = "TIMETRACE_CASCADE_MODE";
pub const ENV_IMAGE_PATH_INDEX: &str = "TIMETRACE_IMAGE_PATH_INDEX";
pub const ENV_IMAGE_PATH_KEY: &str = "TIMETRACE_IMAGE_PATH_KEY";

/// Rows handled per batch by full-table deletes and path recomputation.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;
/// Configuration index holding file-system locations.
pub const FILE_PATH_SETTING_INDEX: &str = "FilePath";
/// Configuration key holding the image base directory.
pub const IMAGE_PATH_SETTING_KEY: &str = "ImagePath";

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    // A missing `.env` file is not an error.
    let _ = dotenv();
});

/// Transaction scope of multi-step cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// Every cascade step commits on its own; a late failure leaves the
    /// earlier steps applied.
    #[default]
    Sequential,
    /// The whole cascade runs in one transaction and rolls back on failure.
    Atomic,
}

impl FromStr for CascadeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "atomic" => Ok(Self::Atomic),
            other => Err(format!("expected sequential|atomic, got `{other}`")),
        }
    }
}

/// Configuration entry that holds the image base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePathSetting {
    pub index: String,
    pub key: String,
}

impl Default for ImagePathSetting {
    fn default() -> Self {
        Self {
            index: FILE_PATH_SETTING_INDEX.to_string(),
            key: IMAGE_PATH_SETTING_KEY.to_string(),
        }
    }
}

/// Options shared by all repositories built on one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOptions {
    /// Rows per batch for full-table deletes and path recomputation.
    pub batch_size: u32,
    pub cascade_mode: CascadeMode,
    /// Source of the base directory used by image path resolution.
    pub image_path_setting: ImagePathSetting,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cascade_mode: CascadeMode::default(),
            image_path_setting: ImagePathSetting::default(),
        }
    }
}

/// Process-level configuration for timetrace core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite file path. `None` selects an in-memory database.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub repository: RepositoryOptions,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            repository: RepositoryOptions::default(),
        }
    }
}

/// Configuration value could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid configuration value `{}` for {}: {}",
            self.value, self.key, self.reason
        )
    }
}

impl Error for ConfigError {}

impl CoreConfig {
    /// Loads configuration from process environment (and `.env`, once).
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = read(ENV_BATCH_SIZE) {
            config.repository.batch_size = parse_batch_size(&raw)?;
        }
        if let Some(raw) = read(ENV_CASCADE_MODE) {
            config.repository.cascade_mode =
                raw.parse().map_err(|reason| ConfigError {
                    key: ENV_CASCADE_MODE,
                    value: raw.clone(),
                    reason,
                })?;
        }
        if let Some(index) = read(ENV_IMAGE_PATH_INDEX) {
            config.repository.image_path_setting.index = index;
        }
        if let Some(key) = read(ENV_IMAGE_PATH_KEY) {
            config.repository.image_path_setting.key = key;
        }

        Ok(config)
    }
}

fn parse_batch_size(raw: &str) -> Result<u32, ConfigError> {
    match raw.parse::<u32>() {
        Ok(0) => Err(ConfigError {
            key: ENV_BATCH_SIZE,
            value: raw.to_string(),
            reason: "batch size must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(err) => Err(ConfigError {
            key: ENV_BATCH_SIZE,
            value: raw.to_string(),
            reason: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CascadeMode, CoreConfig, ENV_BATCH_SIZE, ENV_CASCADE_MODE, ENV_DB_PATH,
        ENV_IMAGE_PATH_KEY, FILE_PATH_SETTING_INDEX,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let config = CoreConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.repository.batch_size, 1000);
        assert_eq!(config.repository.cascade_mode, CascadeMode::Sequential);
        assert_eq!(
            config.repository.image_path_setting.index,
            FILE_PATH_SETTING_INDEX
        );
    }

    #[test]
    fn lookup_overrides_known_keys() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/var/lib/timetrace/timetrace.db"),
            (ENV_BATCH_SIZE, "250"),
            (ENV_CASCADE_MODE, " Atomic "),
            (ENV_IMAGE_PATH_KEY, "Thumbnails"),
        ]))
        .unwrap();

        assert_eq!(
            config.db_path,
            Some(PathBuf::from("/var/lib/timetrace/timetrace.db"))
        );
        assert_eq!(config.repository.batch_size, 250);
        assert_eq!(config.repository.cascade_mode, CascadeMode::Atomic);
        assert_eq!(config.repository.image_path_setting.key, "Thumbnails");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = CoreConfig::from_lookup(lookup_from(&[(ENV_BATCH_SIZE, "0")])).unwrap_err();
        assert_eq!(err.key, ENV_BATCH_SIZE);

        let err =
            CoreConfig::from_lookup(lookup_from(&[(ENV_CASCADE_MODE, "eventually")])).unwrap_err();
        assert_eq!(err.key, ENV_CASCADE_MODE);
        assert!(err.to_string().contains("eventually"));
    }
}
