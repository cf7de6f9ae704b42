// Configuration system for the Pilar classification service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deployment mode, reported on the service info route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Demo,
    Production,
}

impl std::str::FromStr for AppMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(AppMode::Demo),
            "production" | "prod" => Ok(AppMode::Production),
            other => Err(ConfigError::ParseError(format!("unknown app mode '{}'", other))),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub app_mode: AppMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7860,
            app_mode: AppMode::Demo,
        }
    }
}

/// Where the trained artifact lives on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub artifact_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("model/pilar_demo.json"),
        }
    }
}

/// Upload validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted payload in bytes
    pub max_file_size: usize,
    /// MIME types accepted on the predict endpoint
    pub accepted_content_types: Vec<String>,
    /// Smallest accepted image side, in pixels
    pub min_dimension: u32,
    /// Largest accepted image side, in pixels
    pub max_dimension: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            accepted_content_types: [
                "image/jpeg",
                "image/jpg",
                "image/png",
                "image/bmp",
                "image/x-ms-bmp",
                "image/webp",
                "image/gif",
                // Some mobile clients send uploads without a specific type
                "application/octet-stream",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_dimension: 16,
            max_dimension: 4096,
        }
    }
}

impl UploadConfig {
    /// Case-insensitive membership test; parameters such as `; charset=` are ignored.
    pub fn accepts(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.accepted_content_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&essence))
    }
}

/// Inference worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Maximum number of images decoded and classified at the same time
    pub max_concurrent: usize,
    /// Upper bound for one extract + predict pass, in milliseconds
    pub timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get().max(1),
            timeout_ms: 10_000,
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Low-confidence policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyConfig {
    /// Percent in [0, 100]. Predictions strictly below are flagged uncertain.
    /// When unset, the threshold recorded in the model artifact applies.
    pub threshold: Option<f64>,
}

/// Category table source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// TOML, YAML or JSON file replacing the built-in table
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilarConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub upload: UploadConfig,
    pub inference: InferenceConfig,
    pub uncertainty: UncertaintyConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

impl PilarConfig {
    /// Load configuration from file (JSON, TOML, or YAML)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string())),
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string())),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string())),
            _ => Self::from_str(&content),
        }
    }

    /// Load configuration from string, trying each supported format in turn
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<PilarConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<PilarConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<PilarConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Load defaults overlaid with environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `PILAR_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("PILAR_HOST") {
            self.server.bind_address = host;
        }

        if let Ok(port) = std::env::var("PILAR_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid PILAR_PORT value: {}", port),
            }
        }

        if let Ok(mode) = std::env::var("PILAR_APP_MODE") {
            match mode.parse::<AppMode>() {
                Ok(m) => self.server.app_mode = m,
                Err(e) => tracing::warn!("Ignoring PILAR_APP_MODE: {}", e),
            }
        }

        if let Ok(model_path) = std::env::var("PILAR_MODEL_PATH") {
            self.model.artifact_path = PathBuf::from(model_path);
        }

        if let Ok(catalog_path) = std::env::var("PILAR_CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(catalog_path));
        }

        if let Ok(level) = std::env::var("PILAR_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string(),
            ));
        }

        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be > 0".to_string(),
            ));
        }

        if self.upload.accepted_content_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.accepted_content_types cannot be empty".to_string(),
            ));
        }

        if self.upload.min_dimension == 0 || self.upload.min_dimension > self.upload.max_dimension {
            return Err(ConfigError::ValidationError(
                "upload.min_dimension must be in 1..=max_dimension".to_string(),
            ));
        }

        if self.inference.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "inference.max_concurrent must be > 0".to_string(),
            ));
        }

        if self.inference.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "inference.timeout_ms must be > 0".to_string(),
            ));
        }

        if let Some(threshold) = self.uncertainty.threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(ConfigError::ValidationError(format!(
                    "uncertainty.threshold must be a percentage in [0, 100], got {}",
                    threshold
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
