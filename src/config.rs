use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings directory, also the default home of the event database
    pub settings_dir: PathBuf,
    /// SQLite database for scheduled events and contacts
    pub db_path: Option<PathBuf>,
    /// Minimum parser confidence for acting without the fallback
    pub confidence_threshold: f32,
    /// Due-event poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on a single event delivery, in seconds
    pub delivery_timeout_secs: u64,
    /// Language-model fallback settings
    pub fallback: FallbackConfig,
    /// Weather tool settings
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    /// OpenAI-compatible endpoint base URL
    pub endpoint: String,
    pub model: String,
    /// API key; empty means no Authorization header
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub city: String,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            settings_dir: home_dir.join(".magus"),
            db_path: None,
            confidence_threshold: 0.4,
            poll_interval_ms: 200,
            delivery_timeout_secs: 5,
            fallback: FallbackConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            city: "Казань".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults when missing
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home_dir.join(".magus").join("config.toml")
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let config_path = if let Some(p) = path {
            p
        } else {
            self.settings_dir.join("config.toml")
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Resolved database path: explicit setting or `events.db` under the
    /// settings directory.
    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.settings_dir.join("events.db"))
    }
}
