pub mod env;
pub use env::RequiredEnv;

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Tunables loaded from the optional TOML file. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitlinkConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Static page the browser lands on after a successful link
    #[serde(default = "default_complete_url")]
    pub complete_url: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:2000".to_string()
}

fn default_complete_url() -> String {
    "https://thegitbot.vercel.app/auth/complete".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            complete_url: default_complete_url(),
        }
    }
}

/// Provider endpoints and correlation-state policy
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Reject callbacks that do not carry a live `state` token
    #[serde(default = "default_require_state")]
    pub require_state: bool,
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
    /// Outstanding `state` tokens kept per chat user; older ones are evicted
    #[serde(default = "default_max_pending_per_user")]
    pub max_pending_states_per_user: usize,
    #[serde(default = "default_max_pending")]
    pub max_pending_states: usize,
}

fn default_authorize_url() -> String {
    "https://github.com/login/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://github.com/login/oauth/access_token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_scopes() -> Vec<String> {
    ["repo", "admin:repo_hook", "notifications", "read:user"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_require_state() -> bool {
    true
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

fn default_max_pending_per_user() -> usize {
    5
}

fn default_max_pending() -> usize {
    10_000
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            scopes: default_scopes(),
            require_state: default_require_state(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
            max_pending_states_per_user: default_max_pending_per_user(),
            max_pending_states: default_max_pending(),
        }
    }
}

/// Upper bounds for outbound calls (seconds)
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_http_timeout")]
    pub http_seconds: u64,
    #[serde(default = "default_store_timeout")]
    pub store_seconds: u64,
}

fn default_http_timeout() -> u64 {
    10
}

fn default_store_timeout() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            http_seconds: default_http_timeout(),
            store_seconds: default_store_timeout(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<GitlinkConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &str) -> Result<GitlinkConfig, ConfigError> {
    if Path::new(path).exists() {
        load_config(path)
    } else {
        Ok(GitlinkConfig::default())
    }
}
