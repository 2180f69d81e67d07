//! Client configuration
//!
//! Resolution order: built-in defaults, then `config.toml` in the user config
//! directory, then `CHATLOOM_*` environment variables. Command line flags are
//! applied by the caller on top of the loaded value.

use crate::agentic::artifacts::RegenerationPolicy;
use crate::util::errors::{ChatloomError, ChatloomResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BASE_URL: &str = "CHATLOOM_BASE_URL";
pub const ENV_ASSISTANT_TYPE: &str = "CHATLOOM_ASSISTANT_TYPE";

const CONFIG_DIR_NAME: &str = "chatloom";
const CONFIG_FILE_NAME: &str = "config.toml";

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_assistant_type() -> String {
    "default".to_string()
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_idle_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as `X-Assistant-Type` on stream requests.
    #[serde(default = "default_assistant_type")]
    pub assistant_type: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum silence between two stream chunks.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub regeneration_policy: RegenerationPolicy,
    /// Extra headers added to every backend request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            assistant_type: default_assistant_type(),
            request_timeout_secs: default_request_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            regeneration_policy: RegenerationPolicy::default(),
            headers: HashMap::new(),
        }
    }
}

impl ChatClientConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn from_toml(content: &str) -> ChatloomResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ChatloomResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatloomError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Loads `path` (or the default location) and applies env overrides.
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> ChatloomResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => {
                    debug!("Loading config: path={}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        info!(
            "Chat client configured: base_url={}, assistant_type={}",
            config.base_url, config.assistant_type
        );
        Ok(config)
    }

    /// `lookup` abstracts the environment so overrides can be tested.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
        if let Some(assistant_type) = lookup(ENV_ASSISTANT_TYPE).filter(|v| !v.trim().is_empty())
        {
            self.assistant_type = assistant_type.trim().to_string();
        }
    }

    pub fn validate(&self) -> ChatloomResult<()> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ChatloomError::config("base_url must not be empty"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ChatloomError::config(format!(
                "base_url must start with http:// or https://, got {}",
                base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ChatloomError::config("request_timeout_secs must be > 0"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ChatloomError::config("idle_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
