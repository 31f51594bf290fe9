//! Remote provider collaborator.
//!
//! [`OAuthProvider`] is the seam the link manager consumes: authorize URL
//! construction, authorization-code exchange and identity lookup.
//! [`GitHubOAuth`] is the production implementation; [`GitHubClient`] makes
//! the authenticated data calls that commands issue once an account is linked.

mod api;
mod oauth;

pub use api::{
    GitHubClient, GitHubNotification, GitHubProfile, NotificationRepository, NotificationSubject,
};
pub use oauth::GitHubOAuth;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::BearerToken;

const USER_AGENT: &str = concat!("gitlink/", env!("CARGO_PKG_VERSION"));

/// Remote identity returned by the profile endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RemoteIdentity {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Failure talking to the provider. Messages never carry credentials.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("credential rejected by provider")]
    Unauthorized,
    #[error("rate limit exceeded (X-RateLimit-Remaining: {0})")]
    RateLimited(u64),
    #[error("no access token in response ({0})")]
    NoToken(String),
    #[error("unrecognized response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Timeouts, connection failures, rate limits and server-side errors may
    /// succeed on a manual retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout
            | ProviderError::Transport(_)
            | ProviderError::RateLimited(_) => true,
            ProviderError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Malformed(e.without_url().to_string())
        } else {
            ProviderError::Transport(e.without_url().to_string())
        }
    }
}

/// OAuth2 authorization-code provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Authorization endpoint URL the user's browser is sent to.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Exchanges an authorization code for a bearer credential.
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<BearerToken, ProviderError>;

    /// Fetches the identity the credential belongs to.
    async fn fetch_identity(&self, token: &BearerToken) -> Result<RemoteIdentity, ProviderError>;
}

/// Maps non-success statuses to descriptive errors.
///
/// - 401 → credential expired or revoked
/// - 403 → rate limit (reads X-RateLimit-Remaining)
/// - Other non-2xx → generic status error
fn check_response_status(response: &reqwest::Response) -> Result<(), ProviderError> {
    use reqwest::StatusCode;

    match response.status() {
        StatusCode::UNAUTHORIZED => Err(ProviderError::Unauthorized),
        StatusCode::FORBIDDEN => {
            let remaining = response
                .headers()
                .get("X-RateLimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            Err(ProviderError::RateLimited(remaining))
        }
        s if !s.is_success() => Err(ProviderError::Status(s.as_u16())),
        _ => Ok(()),
    }
}
