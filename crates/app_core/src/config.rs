//! Application configuration

use app_fs::{system_encoding_hint, EncodingHint, TreeOptions};
use app_sandbox::SandboxSettings;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub explorer: TreeOptions,
    pub sandbox: SandboxSettings,
    pub logging: LoggingConfig,
    pub recent_projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seed an empty workspace with the starter project
    pub seed_default_project: bool,
    /// Encoding preferred for non-UTF-8 uploads: auto, ja, zh-cn, zh-tw, ko, none
    pub upload_encoding: String,
    /// Script started after a project is opened (empty to disable)
    pub run_script_on_open: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            seed_default_project: true,
            upload_encoding: "auto".to_string(),
            run_script_on_open: "start".to_string(),
        }
    }
}

impl GeneralConfig {
    pub fn encoding_hint(&self) -> EncodingHint {
        match self.upload_encoding.to_lowercase().as_str() {
            "ja" => EncodingHint::Japanese,
            "zh-cn" => EncodingHint::ChineseSimplified,
            "zh-tw" => EncodingHint::ChineseTraditional,
            "ko" => EncodingHint::Korean,
            "none" => EncodingHint::None,
            _ => system_encoding_hint(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log files older than this are deleted at startup
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { retention_days: 7 }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::info!("Configuration loaded from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        tracing::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "Codebox", "Codebox")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Remember a project directory, most recent first
    pub fn push_recent_project(&mut self, path: &str) {
        self.recent_projects.retain(|p| p != path);
        self.recent_projects.insert(0, path.to_string());
        self.recent_projects.truncate(10);
    }
}
