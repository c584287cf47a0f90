//! On-disk configuration for the uploader.
//!
//! The file is TOML and every key is optional. A missing file is the same as an empty one.
//!
//! ```toml
//! [credential]
//! path = "token.json"
//! persist_refreshed = true
//!
//! [api]
//! base_url = "https://www.googleapis.com"
//! upload_base_url = "https://www.googleapis.com"
//!
//! [form]
//! password = "hunter2"
//! channel_selection = true
//! default_privacy = "unlisted"
//! ```

use crate::upload::PrivacyStatus;
use eyre::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub credential: CredentialConfig,
    pub api: ApiConfig,
    pub form: FormConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialConfig {
    /// Where the flat JSON token document lives.
    pub path: PathBuf,
    /// Write the credential back to `path` after a successful refresh.
    pub persist_refreshed: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TOKEN_PATH),
            persist_refreshed: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub upload_base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FormConfig {
    /// Password that gates the upload form. Absent or empty means no gate.
    pub password: Option<String>,
    /// Ask for (and verify) a destination channel before uploading.
    pub channel_selection: bool,
    pub default_privacy: PrivacyStatus,
}

impl FormConfig {
    /// The configured gate password, if the gate is enabled.
    pub fn gate_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

impl Config {
    pub fn from_toml(content: &str) -> eyre::Result<Self> {
        toml::from_str(content).context("parse configuration")
    }

    /// Loads configuration from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("load {}", path.display()))
    }
}
