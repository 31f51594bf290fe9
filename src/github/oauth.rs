//! GitHub OAuth endpoints: authorize URL, code exchange, identity.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::{check_response_status, OAuthProvider, ProviderError, RemoteIdentity, USER_AGENT};
use crate::config::OAuthConfig;
use crate::credentials::BearerToken;

/// OAuth token response. GitHub answers a bad code with HTTP 200 and an
/// `error` field instead of a token.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// GitHub OAuth app client.
pub struct GitHubOAuth {
    http_client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    api_base_url: String,
    scopes: Vec<String>,
    client_id: String,
    client_secret: SecretString,
}

impl GitHubOAuth {
    pub fn new(
        config: &OAuthConfig,
        client_id: String,
        client_secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self {
            http_client,
            authorize_url: config.authorize_url.clone(),
            token_url: config.token_url.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            scopes: config.scopes.clone(),
            client_id,
            client_secret,
        })
    }
}

#[async_trait]
impl OAuthProvider for GitHubOAuth {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<BearerToken, ProviderError> {
        let form_data = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        tracing::debug!(token_url = %self.token_url, "Exchanging authorization code for token");

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form_data[..])
            .send()
            .await?;

        check_response_status(&response)?;

        let token_response: TokenResponse = response.json().await?;

        match token_response.access_token {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => Err(ProviderError::NoToken(
                token_response
                    .error
                    .unwrap_or_else(|| "missing access_token".to_string()),
            )),
        }
    }

    async fn fetch_identity(&self, token: &BearerToken) -> Result<RemoteIdentity, ProviderError> {
        let url = format!("{}/user", self.api_base_url);
        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(token.expose())
            .send()
            .await?;

        check_response_status(&response)?;

        let body: serde_json::Value = response.json().await?;
        if body.get("login").and_then(|v| v.as_str()).is_none() {
            return Err(ProviderError::Malformed("profile has no login".to_string()));
        }
        serde_json::from_value(body).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}
