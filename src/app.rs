use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::{normalize_url, websocket_url};

pub const DEFAULT_API_BASE: &str = "https://regatta-board.herokuapp.com/api/v1/";
pub const DEFAULT_WS_BASE: &str = "wss://regatta-board.herokuapp.com/";

const PRODUCTION_HOST: &str = "regatta-board.herokuapp.com";
const QA_HOST: &str = "regatta-board-qa.herokuapp.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base: String,
    pub ws_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_base: DEFAULT_WS_BASE.to_string(),
        }
    }
}

impl Settings {
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("regattaboard.toml"))
    }

    /// Reads the user config file, then applies `REGATTABOARD_*` environment
    /// overrides. A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        let settings = Self::toml_path()
            .and_then(|path| match Self::load_from(&path) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::debug!("using default settings, {} not loaded: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn load_from(path: &Path) -> std::io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(settings.normalized())
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::toml_path() {
            Some(path) => self.save_to(&path),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir")),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        fs::write(path, toml)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(api) = lookup("REGATTABOARD_API_BASE") {
            self.api_base = api;
        }
        if let Some(ws) = lookup("REGATTABOARD_WS_BASE") {
            self.ws_base = ws;
        }
        self.normalized()
    }

    fn normalized(self) -> Self {
        Self {
            api_base: normalize_url(&self.api_base),
            ws_base: websocket_url(&self.ws_base),
        }
    }

    /// Environment name and API version, e.g. `"production v1"`.
    pub fn api_environment(&self) -> String {
        let env = if self.api_base.contains(PRODUCTION_HOST) {
            "production"
        } else if self.api_base.contains(QA_HOST) {
            "qa"
        } else {
            "local"
        };
        let segments: Vec<&str> = self.api_base.split('/').collect();
        let version = segments
            .len()
            .checked_sub(2)
            .and_then(|i| segments.get(i))
            .copied()
            .unwrap_or_default();
        format!("{} {}", env, version)
    }

    pub fn is_production(&self) -> bool {
        self.api_environment().starts_with("production")
    }
}
