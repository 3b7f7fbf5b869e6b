//! User configuration for the onboarding core.
//!
//! Persisted as JSON in the data directory; every field carries a serde
//! default so old config files keep loading after upgrades.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use crate::models::Provider;

/// Delay before a fully-successful dialog closes itself.
pub const DEFAULT_AUTO_CLOSE_MS: u64 = 1500;

/// Pause between batch token submissions.
pub const DEFAULT_BATCH_SUBMIT_DELAY_MS: u64 = 100;

/// User configuration file name.
const USER_CONFIG_FILE: &str = "config.json";

/// Data directory name.
const DATA_DIR: &str = ".mira_accounts";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Provider pre-selected when the add-account dialog opens.
    #[serde(default = "default_provider")]
    pub default_provider: Provider,
    /// Auto-close delay after full success, in milliseconds.
    #[serde(default = "default_auto_close_ms")]
    pub auto_close_ms: u64,
    /// Delay between batch token submissions, in milliseconds.
    #[serde(default = "default_batch_submit_delay_ms")]
    pub batch_submit_delay_ms: u64,
    /// Log filter used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_provider() -> Provider {
    Provider::Kiro
}

fn default_auto_close_ms() -> u64 {
    DEFAULT_AUTO_CLOSE_MS
}

fn default_batch_submit_delay_ms() -> u64 {
    DEFAULT_BATCH_SUBMIT_DELAY_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            auto_close_ms: default_auto_close_ms(),
            batch_submit_delay_ms: default_batch_submit_delay_ms(),
            log_level: default_log_level(),
        }
    }
}

static USER_CONFIG: OnceLock<RwLock<UserConfig>> = OnceLock::new();

fn config_store() -> &'static RwLock<UserConfig> {
    USER_CONFIG.get_or_init(|| {
        let loaded = read_config_file(&config_file_path()).unwrap_or_default();
        RwLock::new(loaded)
    })
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR)
}

pub fn config_file_path() -> PathBuf {
    data_dir().join(USER_CONFIG_FILE)
}

pub(crate) fn read_config_file(path: &Path) -> Result<UserConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))
}

pub(crate) fn write_config_file(path: &Path, config: &UserConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config file: {}", e))
}

pub fn get_config() -> UserConfig {
    config_store()
        .read()
        .map(|config| config.clone())
        .unwrap_or_default()
}

pub fn update_config(config: UserConfig) -> Result<(), String> {
    write_config_file(&config_file_path(), &config)?;
    if let Ok(mut guard) = config_store().write() {
        *guard = config;
    }
    Ok(())
}
