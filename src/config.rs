use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::conversation::DEFAULT_MAX_TURNS;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub default_model: Option<String>,
    pub history_window: Option<usize>,
    pub api_base: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_default();
        config.default_model = Some(model.to_string());
        config.save()
    }

    /// API key resolution: environment first, then the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.openai_api_key.clone())
    }

    /// Endpoint base resolution: environment first, then the config file, then
    /// the public endpoint.
    pub fn resolve_api_base(&self) -> String {
        std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|b| !b.is_empty())
            .or_else(|| self.api_base.clone())
            .unwrap_or_else(|| crate::openai::DEFAULT_API_BASE.to_string())
    }

    pub fn history_window(&self) -> usize {
        self.history_window.unwrap_or(DEFAULT_MAX_TURNS)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("tutor").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.openai_api_key.is_none());
        assert!(config.default_model.is_none());
        assert_eq!(config.history_window(), DEFAULT_MAX_TURNS);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            openai_api_key: Some("sk-test".to_string()),
            default_model: Some("gpt-4o".to_string()),
            history_window: Some(8),
            api_base: Some("https://example.com/v1".to_string()),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(loaded.default_model.as_deref(), Some("gpt-4o"));
        assert_eq!(loaded.history_window(), 8);
        assert_eq!(loaded.api_base.as_deref(), Some("https://example.com/v1"));
    }

    #[test]
    fn environment_key_wins_over_file() {
        let config = Config {
            openai_api_key: Some("from-file".to_string()),
            ..Default::default()
        };
        std::env::set_var("OPENAI_API_KEY", "from-env");
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-env"));
        std::env::remove_var("OPENAI_API_KEY");
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
