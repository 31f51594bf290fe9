use secrecy::SecretString;

use super::ConfigError;
use crate::credentials::validate_key;

pub const CLIENT_ID_VAR: &str = "GITLINK_GITHUB_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "GITLINK_GITHUB_CLIENT_SECRET";
pub const CALLBACK_BASE_URL_VAR: &str = "GITLINK_CALLBACK_BASE_URL";
pub const DATABASE_URL_VAR: &str = "GITLINK_DATABASE_URL";
pub const ENCRYPTION_KEY_VAR: &str = "GITLINK_ENCRYPTION_KEY";

/// Settings that must come from the environment. Absence of any is fatal.
#[derive(Debug)]
pub struct RequiredEnv {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Public base URL of this service, without trailing slash
    pub callback_base_url: String,
    pub database_url: String,
    pub encryption_key: SecretString,
}

impl RequiredEnv {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let client_id = require(CLIENT_ID_VAR)?;
        let client_secret = require(CLIENT_SECRET_VAR)?;
        let callback_base_url = require(CALLBACK_BASE_URL_VAR)?;
        let database_url = require(DATABASE_URL_VAR)?;
        let encryption_key = require(ENCRYPTION_KEY_VAR)?;

        if !(callback_base_url.starts_with("http://")
            || callback_base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                name: CALLBACK_BASE_URL_VAR,
                reason: "must start with http:// or https://".to_string(),
            });
        }

        validate_key(&encryption_key)?;

        Ok(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
            database_url,
            encryption_key: SecretString::from(encryption_key),
        })
    }
}
