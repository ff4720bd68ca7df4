//! Daemon settings
//!
//! Layered: built-in defaults, then the TOML file (`CONVEYOR_CONFIG`, default
//! `~/.conveyor/conveyor.toml`), then `CONVEYOR__*` environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use conveyor_core::domain::QueueConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "~/.conveyor/conveyor.toml";
const DEFAULT_DB_PATH: &str = "~/.conveyor/conveyor.db";

/// `database_url` value selecting the in-process store
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub host: String,
    pub port: u16,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9627,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    /// Terminal jobs older than this are purged
    pub retention_days: u32,
    /// How often the daemon submits a cleanup job; 0 disables the schedule
    pub interval_hours: u64,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            retention_days: 7,
            interval_hours: 24,
        }
    }
}

impl CleanupSettings {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_hours > 0).then(|| Duration::from_secs(self.interval_hours * 3600))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite path or URL, or `memory`
    pub database_url: String,
    pub rpc: RpcSettings,
    pub log_format: LogFormat,
    /// Daily-rotated log files are written here when set
    pub log_dir: Option<String>,
    pub cleanup: CleanupSettings,
    pub queues: BTreeMap<String, QueueConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DB_PATH.to_string(),
            rpc: RpcSettings::default(),
            log_format: LogFormat::default(),
            log_dir: None,
            cleanup: CleanupSettings::default(),
            queues: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from the configured file path and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONVEYOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let path = shellexpand::tilde(&path).into_owned();

        let config = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("CONVEYOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read settings from {}", path))?;

        Self::from_config(config)
    }

    /// Parse settings from TOML text (no environment layer)
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("failed to parse settings")?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let mut settings: Settings = config
            .try_deserialize()
            .context("invalid settings")?;
        settings.database_url = shellexpand::tilde(&settings.database_url).into_owned();
        Ok(settings)
    }

    pub fn is_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case(MEMORY_DATABASE)
    }

    /// Configured queues, or the standard lanes when none are configured
    pub fn queue_configs(&self) -> BTreeMap<String, QueueConfig> {
        if self.queues.is_empty() {
            default_queues()
        } else {
            self.queues.clone()
        }
    }
}

/// Standard lanes registered when the settings name no queues
pub fn default_queues() -> BTreeMap<String, QueueConfig> {
    let standard = QueueConfig::default();
    let mut queues = BTreeMap::new();
    queues.insert("report_generation".to_string(), standard.clone());
    queues.insert(
        "export_creation".to_string(),
        QueueConfig::new(10, 3, Duration::from_millis(3_000)),
    );
    queues.insert("email_delivery".to_string(), standard.clone());
    queues.insert("notification_delivery".to_string(), standard.clone());
    queues.insert("data_processing".to_string(), standard.clone());
    queues.insert("cleanup".to_string(), QueueConfig::new(1, 1, Duration::from_secs(60)));
    queues
}
