use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Environment fallback consulted when no session key is set.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub model: Option<String>,
    pub api_base: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Write a default config file on first run so the model and API base
    /// can be overridden by editing it.
    pub fn ensure_exists() -> Result<()> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(())
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("ideachat").join("config.json"))
    }
}

/// Session-scoped credential store. The key lives only in process memory and
/// is gone when the application exits; `resolve` falls back to the
/// environment when nothing was entered this session.
#[derive(Clone, Default)]
pub struct KeyStore {
    session: Arc<Mutex<Option<String>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.session.lock().expect("key store poisoned").clone()
    }

    pub fn set(&self, key: &str) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        *self.session.lock().expect("key store poisoned") = Some(key.to_string());
    }

    pub fn clear(&self) {
        *self.session.lock().expect("key store poisoned") = None;
    }

    /// Session key first, then the process environment, read at call time.
    pub fn resolve(&self) -> Option<String> {
        self.get().or_else(|| {
            std::env::var(API_KEY_ENV)
                .ok()
                .filter(|key| !key.trim().is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ideachat").join("config.json");

        let config = Config {
            model: Some("gemini-3-pro-preview".to_string()),
            api_base: None,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.model.as_deref(), Some("gemini-3-pro-preview"));
        assert!(loaded.api_base.is_none());
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.model.is_none());
    }

    #[test]
    fn key_store_set_get_clear() {
        let keys = KeyStore::new();
        assert_eq!(keys.get(), None);

        keys.set("  sk-test-123  ");
        assert_eq!(keys.get().as_deref(), Some("sk-test-123"));

        keys.set("   ");
        assert_eq!(keys.get().as_deref(), Some("sk-test-123"));

        keys.clear();
        assert_eq!(keys.get(), None);
    }

    #[test]
    fn clones_share_the_session_key() {
        let keys = KeyStore::new();
        let other = keys.clone();
        keys.set("sk-shared");
        assert_eq!(other.get().as_deref(), Some("sk-shared"));
    }
}
