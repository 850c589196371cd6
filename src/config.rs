//! Configuration management

use crate::{EngineError, Result};
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration
///
/// Persistent settings for backend selection, speech parameters and
/// default wait timeouts, stored as INI.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.speechrt.cfg by default)
    path: PathBuf,
}

impl Config {
    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| EngineError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| EngineError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| EngineError::Config(format!("Failed to save config: {}", e)))
    }

    /// Default config file path (~/.speechrt.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".speechrt.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("engine"))
            .set("backend", "auto")
            .set("wait_timeout_ms", "5000");

        ini.with_section(Some("speech"))
            .set("rate", "50")
            .set("volume", "80")
            .set("voice_idx", "0");

        ini.with_section(Some("espeak"));

        ini
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Backend name: "auto", "espeak" or "native"
    pub fn backend(&self) -> String {
        self.get_string("engine", "backend", "auto").trim().to_lowercase()
    }

    /// Default timeout for blocking state waits; `None` when set to 0
    pub fn wait_timeout(&self) -> Option<Duration> {
        match self.get_int("engine", "wait_timeout_ms", 5000) {
            ms if ms > 0 => Some(Duration::from_millis(ms as u64)),
            _ => None,
        }
    }

    /// Speech rate (0-100)
    pub fn rate(&self) -> Option<u8> {
        self.get_int("speech", "rate", -1)
            .try_into()
            .ok()
            .filter(|&r| r <= 100)
    }

    /// Speech volume (0-100)
    pub fn volume(&self) -> Option<u8> {
        self.get_int("speech", "volume", -1)
            .try_into()
            .ok()
            .filter(|&v| v <= 100)
    }

    /// Voice index for the backend
    pub fn voice_idx(&self) -> Option<usize> {
        self.get_int("speech", "voice_idx", -1).try_into().ok()
    }

    /// Explicit espeak-ng executable, if configured
    pub fn espeak_path(&self) -> Option<String> {
        self.non_empty("espeak", "path")
    }

    /// Explicit WAV player command, if configured
    pub fn espeak_player(&self) -> Option<String> {
        self.non_empty("espeak", "player")
    }

    fn non_empty(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl Default for Config {
    /// In-memory defaults, never written to disk
    fn default() -> Self {
        Self {
            ini: Self::default_config(),
            path: Self::config_path(),
        }
    }
}
