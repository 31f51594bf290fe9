use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{check_response_status, ProviderError, USER_AGENT};
use crate::credentials::BearerToken;

/// Full profile of the authenticated user.
#[derive(Debug, Deserialize)]
pub struct GitHubProfile {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
}

/// Subject of a GitHub notification.
#[derive(Debug, Deserialize)]
pub struct NotificationSubject {
    pub title: String,
    #[serde(rename = "type")]
    pub subject_type: String,
    pub url: Option<String>,
}

/// Repository a notification belongs to.
#[derive(Debug, Deserialize)]
pub struct NotificationRepository {
    pub full_name: String,
}

/// GitHub notification.
#[derive(Debug, Deserialize)]
pub struct GitHubNotification {
    pub id: String,
    pub reason: String,
    pub unread: bool,
    pub updated_at: String,
    pub subject: NotificationSubject,
    pub repository: Option<NotificationRepository>,
}

/// HTTP client for the GitHub REST API.
///
/// Holds no credential; each call borrows the caller's [`BearerToken`] for
/// the duration of the request.
#[derive(Clone)]
pub struct GitHubClient {
    http_client: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the authenticated user's profile.
    pub async fn fetch_profile(&self, token: &BearerToken) -> Result<GitHubProfile, ProviderError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.expose())
            .send()
            .await?;

        check_response_status(&response)?;
        Ok(response.json::<GitHubProfile>().await?)
    }

    /// Fetch the authenticated user's unread notifications.
    pub async fn fetch_notifications(
        &self,
        token: &BearerToken,
        limit: u8,
    ) -> Result<Vec<GitHubNotification>, ProviderError> {
        let url = format!("{}/notifications?per_page={}", self.base_url, limit);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.expose())
            .send()
            .await?;

        check_response_status(&response)?;
        Ok(response.json::<Vec<GitHubNotification>>().await?)
    }
}
