//! Configuration.
//!
//! Typed structs mapping to the YAML configuration file, with defaults and
//! validation. Everything path-like defaults under the platform data
//! directory so a bare `cloudkeep` invocation works.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub secrets: SecretsConfig,
    pub sync: SyncConfig,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

/// Blob store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding per-account stores
    /// (`<backup_root>/<provider>/<account_id>/`).
    pub backup_root: PathBuf,
    /// Materialize into `current/` with hardlinks instead of copies.
    pub use_hardlinks: bool,
}

/// Catalog database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite catalog file.
    pub path: PathBuf,
}

/// Secrets file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Path of the JSON secrets file (created mode 0600).
    pub path: PathBuf,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Changes requested per provider page (provider max 1000).
    pub page_size: u32,
}

/// Default retention limits applied when an account has no policy row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub keep_last_n: u32,
    pub keep_days: u32,
}

/// Logging settings consumed by the CLI's tracing-subscriber setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("cloudkeep")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_root: data_dir().join("backups"),
            use_hardlinks: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("catalog.db"),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("secrets.json"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { page_size: 1000 }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last_n: 10,
            keep_days: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloudkeep")
            .join("config.yaml")
    }

    /// Validate and return all errors found; empty means valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.sync.page_size == 0 || self.sync.page_size > 1000 {
            errors.push(ValidationError {
                field: "sync.page_size".into(),
                message: "must be in range 1..=1000".into(),
            });
        }
        if self.retention.keep_last_n == 0 {
            errors.push(ValidationError {
                field: "retention.keep_last_n".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retention.keep_days == 0 {
            errors.push(ValidationError {
                field: "retention.keep_days".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_passes_validation() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.sync.page_size, 1000);
        assert_eq!(cfg.retention.keep_last_n, 10);
        assert_eq!(cfg.retention.keep_days, 30);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
storage:
  backup_root: /srv/backups
  use_hardlinks: true
database:
  path: /srv/cloudkeep/catalog.db
secrets:
  path: /srv/cloudkeep/secrets.json
sync:
  page_size: 500
retention:
  keep_last_n: 5
  keep_days: 14
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.storage.backup_root, PathBuf::from("/srv/backups"));
        assert!(cfg.storage.use_hardlinks);
        assert_eq!(cfg.database.path, PathBuf::from("/srv/cloudkeep/catalog.db"));
        assert_eq!(cfg.sync.page_size, 500);
        assert_eq!(cfg.retention.keep_last_n, 5);
        assert_eq!(cfg.retention.keep_days, 14);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "retention:\n  keep_days: 7\n";
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).unwrap();
        assert_eq!(cfg.retention.keep_days, 7);
        assert_eq!(cfg.retention.keep_last_n, 10);
        assert_eq!(cfg.sync.page_size, 1000);
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.sync.page_size, 1000);
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut cfg = Config::default();
        cfg.sync.page_size = 0;
        cfg.retention.keep_last_n = 0;
        cfg.retention.keep_days = 0;
        cfg.logging.level = "loud".into();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "sync.page_size",
                "retention.keep_last_n",
                "retention.keep_days",
                "logging.level"
            ]
        );
    }

    #[test]
    fn validate_rejects_oversized_page() {
        let mut cfg = Config::default();
        cfg.sync.page_size = 1001;
        assert!(cfg.validate().iter().any(|e| e.field == "sync.page_size"));
    }
}
