//! Configuration module for HMS
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all optional values.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use hms_document::document::value::parse_instant;
use hms_document::document::DocumentStoreConfig;

use crate::catalog::CatalogSettings;
use crate::error::{HmsError, Result};
use crate::model::DELETED_FLAG;

/// Upper bound for `evaluation.expiry_window_days` (about a century)
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 36_500;

/// Main configuration structure for HMS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Query evaluation configuration
    pub evaluation: EvaluationConfig,

    /// Seed data configuration
    pub seed: SeedConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HmsError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| HmsError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.collection.is_empty() {
            return Err(HmsError::Config("Collection name cannot be empty".to_string()));
        }

        if self.store.max_document_size == 0 {
            return Err(HmsError::Config(
                "Max document size cannot be 0".to_string(),
            ));
        }

        if self.store.max_nesting_depth == 0 {
            return Err(HmsError::Config(
                "Max nesting depth cannot be 0".to_string(),
            ));
        }

        EnvFilter::try_new(&self.logging.level).map_err(|e| {
            HmsError::Config(format!("Invalid log level '{}': {}", self.logging.level, e))
        })?;

        if !(1..=MAX_EXPIRY_WINDOW_DAYS).contains(&self.evaluation.expiry_window_days) {
            return Err(HmsError::Config(format!(
                "Expiry window must be between 1 and {} days, got {}",
                MAX_EXPIRY_WINDOW_DAYS, self.evaluation.expiry_window_days
            )));
        }

        self.evaluation.reference_instant()?;

        Ok(())
    }

    /// Document store settings
    pub fn store_config(&self) -> Result<DocumentStoreConfig> {
        Ok(DocumentStoreConfig {
            max_document_size: self.store.max_document_size,
            max_nesting_depth: self.store.max_nesting_depth,
            reference_time: self.evaluation.reference_instant()?,
        })
    }

    /// Catalog settings
    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            expiry_window_days: self.evaluation.expiry_window_days,
            exclude_deleted: self
                .evaluation
                .exclude_deleted
                .then(|| DELETED_FLAG.to_string()),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Collection holding appointments
    pub collection: String,

    /// Maximum document size in bytes
    pub max_document_size: usize,

    /// Maximum nesting depth for documents
    pub max_nesting_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let engine = DocumentStoreConfig::default();
        Self {
            collection: "appointments".to_string(),
            max_document_size: engine.max_document_size,
            max_nesting_depth: engine.max_nesting_depth,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,

    /// JSON format
    Json,
}

/// Query evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Instant bound to `$$NOW` (RFC 3339 or `YYYY-MM-DD`); the clock when unset
    pub reference_time: Option<String>,

    /// Window for the expiring-medicines report, in days
    pub expiry_window_days: i64,

    /// Drop soft-deleted records from every catalog query
    pub exclude_deleted: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            reference_time: None,
            expiry_window_days: 60,
            exclude_deleted: false,
        }
    }
}

impl EvaluationConfig {
    /// Parsed reference instant
    pub fn reference_instant(&self) -> Result<Option<DateTime<Utc>>> {
        self.reference_time
            .as_deref()
            .map(|s| {
                parse_instant(s).ok_or_else(|| {
                    HmsError::Config(format!("Invalid reference time '{}'", s))
                })
            })
            .transpose()
    }
}

/// Seed data configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// JSON seed file; the built-in fixture when unset
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.store.collection, "appointments");
        assert_eq!(config.store.max_document_size, 16 * 1024 * 1024);
        assert_eq!(config.store.max_nesting_depth, 100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.evaluation.expiry_window_days, 60);
        assert!(!config.evaluation.exclude_deleted);
        assert!(config.seed.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_str() {
        let toml = r#"
[store]
collection = "visits"

[logging]
level = "debug"
format = "json"

[evaluation]
reference_time = "2025-05-09"
expiry_window_days = 30
exclude_deleted = true

[seed]
path = "data/appointments.json"
"#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.store.collection, "visits");
        assert_eq!(config.store.max_nesting_depth, 100);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.seed.path, Some(PathBuf::from("data/appointments.json")));

        let store = config.store_config().unwrap();
        assert_eq!(
            store.reference_time,
            Some(Utc.with_ymd_and_hms(2025, 5, 9, 0, 0, 0).unwrap())
        );

        let settings = config.catalog_settings();
        assert_eq!(settings.expiry_window_days, 30);
        assert_eq!(settings.exclude_deleted.as_deref(), Some("is_deleted"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.evaluation.reference_time = Some("next tuesday".to_string());
        assert!(config.validate().is_err());

        config.evaluation.reference_time = Some("2025-05-09T12:00:00Z".to_string());
        assert!(config.validate().is_ok());

        config.evaluation.expiry_window_days = 0;
        assert!(config.validate().is_err());

        config.evaluation.expiry_window_days = 60;
        config.store.max_document_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expiry_window_upper_bound() {
        let config = Config::parse_str("[evaluation]\nexpiry_window_days = 200000000000000").unwrap();
        assert!(matches!(config.validate(), Err(HmsError::Config(_))));

        let config = Config::parse_str("[evaluation]\nexpiry_window_days = 36500").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hms.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.logging.level, "warn");

        let missing = Config::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(HmsError::Config(_))));

        std::fs::write(&path, "[logging\nlevel = ").unwrap();
        assert!(matches!(Config::from_file(&path), Err(HmsError::Config(_))));
    }
}
