//! Configuration management for linear-tools

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Personal access token that bypasses the OAuth flow
pub const ENV_ACCESS_TOKEN: &str = "LINEAR_ACCESS_TOKEN";
pub const ENV_CLIENT_ID: &str = "LINEAR_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "LINEAR_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "LINEAR_REDIRECT_URI";
pub const ENV_API_URL: &str = "LINEAR_API_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub oauth: OAuthConfig,
    /// Personal access token. Normally supplied through `LINEAR_ACCESS_TOKEN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub graphql_url: String,
    /// Page size used by issue search when the caller gives none
    pub default_page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            graphql_url: "https://api.linear.app/graphql".to_string(),
            default_page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    /// Tokens expiring within this many seconds are refreshed before use
    pub refresh_margin_secs: u64,
    /// Keep OAuth tokens on disk between runs
    pub persist_tokens: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://linear.app/oauth/authorize".to_string(),
            token_url: "https://api.linear.app/oauth/token".to_string(),
            scopes: vec![
                "read".to_string(),
                "write".to_string(),
                "issues:create".to_string(),
            ],
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            refresh_margin_secs: 300,
            persist_tokens: true,
        }
    }
}

impl OAuthConfig {
    /// True when every client setting needed to start an OAuth flow is present
    pub fn has_client(&self) -> bool {
        [&self.client_id, &self.client_secret, &self.redirect_uri]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

impl Config {
    /// Load configuration from the default location (or defaults), then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a configuration file without touching the environment
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(id) = non_empty(ENV_CLIENT_ID) {
            self.oauth.client_id = Some(id);
        }
        if let Some(secret) = non_empty(ENV_CLIENT_SECRET) {
            self.oauth.client_secret = Some(secret);
        }
        if let Some(uri) = non_empty(ENV_REDIRECT_URI) {
            self.oauth.redirect_uri = Some(uri);
        }
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api.graphql_url = url;
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "linear-tools") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }
}
