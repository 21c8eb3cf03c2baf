use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{forecast::DEFAULT_WINDOW_SIZE, history::PersistMode, reconcile::DEFAULT_TAIL};

/// Environment variable that takes precedence over `provider.api_key`.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// The fixed point the station observes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Tamansari, Bandung".to_string(),
            latitude: -6.90389,
            longitude: 107.61861,
        }
    }
}

/// Primary provider access. The API key is treated as an opaque string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub icon_base_url: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org".to_string(),
            icon_base_url: "https://openweathermap.org/img/wn".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Civil zone used to stamp primary samples and localize forecast times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub utc_offset_minutes: i32,
    pub zone_label: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 7 * 60,
            zone_label: "WIB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Defaults to `history.csv` in the platform data directory.
    pub path: Option<PathBuf>,
    pub mode: PersistMode,
}

/// OCR feed tables. Its timestamps are zoned independently of the primary clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryConfig {
    pub observations_path: Option<PathBuf>,
    pub forecast_path: Option<PathBuf>,
    pub utc_offset_minutes: i32,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            observations_path: None,
            forecast_path: None,
            utc_offset_minutes: 7 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub forecast_window: usize,
    pub reconcile_tail: usize,
    pub refresh_interval_mins: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            forecast_window: DEFAULT_WINDOW_SIZE,
            reconcile_tail: DEFAULT_TAIL,
            refresh_interval_mins: 10,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// [provider]
/// api_key = "..."
///
/// [secondary]
/// observations_path = "/srv/ocr/observations.csv"
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub provider: ProviderConfig,
    pub clock: ClockConfig,
    pub history: HistoryConfig,
    pub secondary: SecondaryConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "cuaca", "cuaca")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Where the primary history is persisted.
    pub fn history_path(&self) -> Result<PathBuf> {
        match &self.history.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("history.csv")),
        }
    }

    /// API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Option<String> {
        pick_api_key(std::env::var(API_KEY_ENV).ok(), self.provider.api_key.as_deref())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.provider.api_key = Some(api_key);
    }

    pub fn zone(&self) -> Result<FixedOffset> {
        offset_from_minutes(self.clock.utc_offset_minutes)
            .context("Invalid [clock] utc_offset_minutes")
    }

    pub fn secondary_zone(&self) -> Result<FixedOffset> {
        offset_from_minutes(self.secondary.utc_offset_minutes)
            .context("Invalid [secondary] utc_offset_minutes")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.display.refresh_interval_mins.max(1) * 60)
    }
}

fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| anyhow!("UTC offset of {minutes} minutes is out of range"))
}

fn pick_api_key(from_env: Option<String>, from_file: Option<&str>) -> Option<String> {
    from_env
        .filter(|key| !key.trim().is_empty())
        .or_else(|| from_file.filter(|key| !key.trim().is_empty()).map(str::to_string))
}
