//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Main configuration structure
///
/// Every section and key is optional in a config file; anything left out
/// keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Inventory scan configuration
    pub scan: ScanConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Application id whose installs are counted
    pub target_app_id: i64,
    /// Header name of the application id column (matched case-insensitively)
    pub app_id_column: String,
    /// Field delimiter, exactly one character
    pub delimiter: String,
    /// Column used when the header does not name the application id column
    pub fallback_column: usize,
    pub progress_interval_ms: u64,
    /// Lines read between two polls of the cancellation flag
    pub cancel_check_lines: usize,
    pub buffer_size_kb: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
    pub per_user: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            scan: ScanConfig::default(),
            output: OutputConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_app_id: 374,
            app_id_column: "applicationid".to_string(),
            delimiter: ",".to_string(),
            fallback_column: 0,
            progress_interval_ms: 1000,
            cancel_check_lines: 4096,
            buffer_size_kb: 64,
        }
    }
}

impl ScanConfig {
    /// The delimiter as a single char. Falls back to `,` for an invalid
    /// value; [`Config::validate`] rejects those before a run starts.
    pub fn delimiter_char(&self) -> char {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => ',',
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = match Self::locate() {
            Some(path) => Self::load_from_file(&path)?,
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// The config file [`Config::load`] reads, if any exists.
    ///
    /// Loading runs before logging is set up, so callers that want to record
    /// which file was used ask for it here once their subscriber is installed.
    pub fn locate() -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("license-calc.toml"),
            PathBuf::from(".license-calc.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("license-calc").join("config.toml"));
        }
        first_existing(&candidates)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Scan overrides
        if let Ok(val) = env::var("LICENSE_CALC_TARGET_APP_ID") {
            self.scan.target_app_id = val
                .parse()
                .context("Invalid LICENSE_CALC_TARGET_APP_ID")?;
        }
        if let Ok(val) = env::var("LICENSE_CALC_APP_ID_COLUMN") {
            self.scan.app_id_column = val;
        }
        if let Ok(val) = env::var("LICENSE_CALC_DELIMITER") {
            self.scan.delimiter = val;
        }
        if let Ok(val) = env::var("LICENSE_CALC_PROGRESS_INTERVAL_MS") {
            self.scan.progress_interval_ms = val
                .parse()
                .context("Invalid LICENSE_CALC_PROGRESS_INTERVAL_MS")?;
        }
        if let Ok(val) = env::var("LICENSE_CALC_BUFFER_SIZE_KB") {
            self.scan.buffer_size_kb = val
                .parse()
                .context("Invalid LICENSE_CALC_BUFFER_SIZE_KB")?;
        }

        // Path overrides
        if let Ok(val) = env::var("LICENSE_CALC_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.delimiter.chars().count() != 1 {
            return Err(anyhow::anyhow!(
                "Delimiter must be exactly one character, got {:?}",
                self.scan.delimiter
            ));
        }

        if self.scan.app_id_column.trim().is_empty() {
            return Err(anyhow::anyhow!("Application id column name cannot be empty"));
        }

        if self.scan.progress_interval_ms == 0 {
            return Err(anyhow::anyhow!("Progress interval must be greater than 0"));
        }

        if self.scan.cancel_check_lines == 0 {
            return Err(anyhow::anyhow!("Cancel check interval must be greater than 0"));
        }

        if self.scan.buffer_size_kb < 1 || self.scan.buffer_size_kb > 4096 {
            return Err(anyhow::anyhow!(
                "Buffer size must be between 1KB and 4096KB, got {}KB",
                self.scan.buffer_size_kb
            ));
        }

        if self.scan.progress_interval_ms < 100 {
            warn!(
                progress_interval_ms = self.scan.progress_interval_ms,
                "Progress interval is very short, output may be noisy"
            );
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|path| path.is_file()).cloned()
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance.
///
/// A configuration that fails to load is reported once and replaced by the
/// defaults; call [`Config::load`] directly to surface the error instead.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: {e:#}; using default configuration");
            Config::default()
        })
    })
}

/// Install an already loaded configuration as the global instance.
/// Returns `false` if a configuration was installed earlier.
pub fn set_config(config: Config) -> bool {
    CONFIG.set(config).is_ok()
}
