use crate::schema::{classify_lifecycle, ResourceSchema};
use crate::{EventDecoder, JsonRow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for ViewSync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a burst of cache changes bumps the version (ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Resources whose rows are plain JSON objects
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            logging: LoggingConfig::default(),
            resources: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn resource(&self, namespace: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.namespace == namespace)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Equals,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Dot-separated path of the compared field
    pub field: String,
    #[serde(default)]
    pub kind: FilterKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Field whose presence marks a soft delete. Null, `false`, blank strings
    /// and numeric zero count as absent.
    #[serde(default)]
    pub deleted_marker: Option<String>,
    /// Boolean field; a false value makes the row inactive
    #[serde(default)]
    pub active_flag: Option<String>,
}

/// A resource declared in configuration, with `JsonRow` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub namespace: String,

    /// Key of the row in upsert payloads (defaults to the namespace without a trailing "s")
    #[serde(default)]
    pub singular: Option<String>,

    /// Key of the list in batch payloads (defaults to the namespace)
    #[serde(default)]
    pub plural: Option<String>,

    #[serde(default)]
    pub search_fields: Vec<String>,

    /// Derived search fields: name -> fields joined with a space
    #[serde(default)]
    pub search_concat: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub filters: BTreeMap<String, FilterRule>,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl ResourceConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            singular: None,
            plural: None,
            search_fields: Vec::new(),
            search_concat: BTreeMap::new(),
            filters: BTreeMap::new(),
            lifecycle: LifecycleConfig::default(),
        }
    }

    pub fn decoder(&self) -> EventDecoder {
        let derived = EventDecoder::for_namespace(&self.namespace);
        EventDecoder::new(
            self.singular.as_deref().unwrap_or(derived.singular()),
            self.plural.as_deref().unwrap_or(derived.plural()),
        )
    }

    /// Build the matcher/classifier schema for this resource.
    pub fn schema(&self) -> ResourceSchema<JsonRow> {
        let mut builder = ResourceSchema::builder(self.namespace.clone());

        for path in &self.search_fields {
            let field = path.clone();
            builder = builder.search_field(path.clone(), move |row: &JsonRow| row.text_at(&field));
        }

        for (name, parts) in &self.search_concat {
            let parts = parts.clone();
            builder = builder.search_field(name.clone(), move |row: &JsonRow| {
                let joined: Vec<String> = parts.iter().filter_map(|p| row.text_at(p)).collect();
                (!joined.is_empty()).then(|| joined.join(" "))
            });
        }

        for (key, rule) in &self.filters {
            let field = rule.field.clone();
            builder = match rule.kind {
                FilterKind::Equals => {
                    builder.equals_filter(key.clone(), move |row: &JsonRow| row.text_at(&field))
                }
                FilterKind::Flag => {
                    builder.flag_filter(key.clone(), move |row: &JsonRow| row.flag_at(&field))
                }
            };
        }

        let deleted_marker = self.lifecycle.deleted_marker.clone();
        let active_flag = self.lifecycle.active_flag.clone();
        builder
            .classifier(move |row: &JsonRow| {
                let deleted = deleted_marker
                    .as_deref()
                    .is_some_and(|path| marks_deleted(row.get_path(path)));
                let active = active_flag
                    .as_deref()
                    .and_then(|path| row.flag_at(path))
                    .unwrap_or(true);
                classify_lifecycle(deleted, active)
            })
            .build()
    }
}

fn marks_deleted(marker: Option<&serde_json::Value>) -> bool {
    use serde_json::Value;
    match marker {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(_) => true,
    }
}

/// Configuration loader with file discovery and environment overrides
#[derive(Debug)]
pub struct ConfigManager {
    config: SyncConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Config file (./.viewsync.toml, then ~/.viewsync/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let (config, config_path) = Self::discover_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file; a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    pub fn from_config(config: SyncConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn finish(config: SyncConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;

        info!(
            path = ?config_path,
            debounce_ms = config.debounce_ms,
            resources = config.resources.len(),
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    fn discover_config_file() -> Result<(SyncConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".viewsync.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".viewsync").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((SyncConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<SyncConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `VIEWSYNC_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(mut config: SyncConfig, lookup: F) -> SyncConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("VIEWSYNC_DEBOUNCE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.debounce_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring unparseable VIEWSYNC_DEBOUNCE_MS"),
            }
        }
        if let Some(level) = lookup("VIEWSYNC_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("VIEWSYNC_LOG_FORMAT") {
            config.logging.format = format;
        }
        config
    }

    pub fn validate_config(config: &SyncConfig) -> Result<(), ConfigError> {
        if config.debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "debounce_ms must be greater than zero".into(),
            ));
        }

        if !matches!(config.logging.format.as_str(), "pretty" | "json" | "compact") {
            return Err(ConfigError::ValidationError(format!(
                "unknown log format '{}'",
                config.logging.format
            )));
        }

        let mut seen = HashSet::new();
        for resource in &config.resources {
            if resource.namespace.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "resource namespace must not be empty".into(),
                ));
            }
            if !seen.insert(resource.namespace.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate resource namespace '{}'",
                    resource.namespace
                )));
            }
            for (key, rule) in &resource.filters {
                if rule.field.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "filter '{}' of '{}' has no field",
                        key, resource.namespace
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> SyncConfig {
        self.config
    }
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
