use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};
use shared::types::METADATA_DIR;
use shared::utils::{home_dir, storage_dir};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: usize = 5;

/// Providers that refuse to run without an API key.
const KEYED_PROVIDERS: &[&str] = &["openai", "gemini", "claude"];

/// `provider:modelID` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: String,
    pub model_id: String,
}

/// Contents of `.mindshell/config.json`.
///
/// Field names match the on-disk JSON written by earlier releases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: String,
    #[serde(rename = "APIKeys", default)]
    pub api_keys: HashMap<String, String>,
    #[serde(rename = "isShellModeActive", default)]
    pub is_shell_mode_active: bool,
    #[serde(rename = "ProjectPath", default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(rename = "maxRecoveryAttempts", default, skip_serializing_if = "Option::is_none")]
    pub max_recovery_attempts: Option<usize>,
    #[serde(rename = "streamTimeoutSecs", default, skip_serializing_if = "Option::is_none")]
    pub stream_timeout_secs: Option<u64>,
}

impl Config {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Read `config.json` from `dir`. A missing file is `Ok(None)`.
    pub fn load_from(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    pub fn save_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(Self::path_in(dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Project config if present, then the global one, then defaults; `.env`
    /// and environment variables are applied on top.
    pub fn load() -> Self {
        if let Err(err) = dotenv() {
            debug!("No .env loaded: {}", err);
        }

        let candidates = [storage_dir(), home_dir().join(METADATA_DIR)];
        let mut config = Self::default();
        for dir in candidates.iter() {
            match Self::load_from(dir) {
                Ok(Some(found)) => {
                    debug!("Loaded config from {}", dir.display());
                    config = found;
                    break;
                }
                Ok(None) => continue,
                Err(e) => warn!("Failed to load config from {}: {}", dir.display(), e),
            }
        }

        config.apply_env(|key| env::var(key).ok());
        config
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("MINDSHELL_MODEL").filter(|m| !m.is_empty()) {
            self.model = model;
        }
        for (var, provider) in [("OPENAI_API_KEY", "openai"), ("GEMINI_API_KEY", "gemini")] {
            if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
                self.api_keys.entry(provider.to_string()).or_insert(key);
            }
        }
    }

    pub fn model_selection(&self) -> Option<ModelSelection> {
        if self.model.is_empty() {
            return None;
        }
        let (provider, model_id) = match self.model.split_once(':') {
            Some((provider, id)) if !id.is_empty() => (provider, id),
            Some((provider, _)) => (provider, self.model.as_str()),
            None => (self.model.as_str(), self.model.as_str()),
        };
        Some(ModelSelection {
            provider: provider.to_string(),
            model_id: model_id.to_string(),
        })
    }

    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys
            .get(provider)
            .map(String::as_str)
            .filter(|key| !key.is_empty())
    }

    pub fn is_valid(&self) -> bool {
        match self.model_selection() {
            None => false,
            Some(selection) if KEYED_PROVIDERS.contains(&selection.provider.as_str()) => {
                self.api_key(&selection.provider).is_some()
            }
            Some(_) => true,
        }
    }

    pub fn max_recovery_attempts(&self) -> usize {
        self.max_recovery_attempts
            .unwrap_or(DEFAULT_MAX_RECOVERY_ATTEMPTS)
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout_secs.map(Duration::from_secs)
    }
}
