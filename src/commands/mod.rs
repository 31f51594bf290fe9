//! Chat-command glue over the link manager.
//!
//! Each handler takes the invoking chat user's id and returns the text to send
//! back. Delivery (ephemeral reply, direct message) and command registration
//! belong to the chat platform adapter.

use std::fmt::Write as _;
use std::sync::Arc;
use tracing::warn;

use crate::github::{GitHubClient, ProviderError};
use crate::link::{LinkError, LinkManager};

const NOTIFICATION_LIMIT: u8 = 10;

pub struct CommandHandler {
    link_manager: Arc<LinkManager>,
    github: GitHubClient,
}

impl CommandHandler {
    pub fn new(link_manager: Arc<LinkManager>, github: GitHubClient) -> Self {
        Self {
            link_manager,
            github,
        }
    }

    /// `/auth`: authorization link, unless the user is already linked.
    pub async fn auth(&self, chat_user_id: &str) -> String {
        match self.link_manager.status(chat_user_id).await {
            Ok(Some(account)) => format!(
                "✅ You are already linked to GitHub user: `{}`",
                account.remote_username
            ),
            Ok(None) => format!(
                "🔗 Link your GitHub account: {}",
                self.link_manager.begin_link(chat_user_id)
            ),
            Err(e) => failure(chat_user_id, e),
        }
    }

    /// `/unauth`
    pub async fn unauth(&self, chat_user_id: &str) -> String {
        match self.link_manager.unlink(chat_user_id).await {
            Ok(true) => "✅ You have been unlinked from GitHub.".to_string(),
            Ok(false) => "ℹ️ You were not linked to any GitHub account.".to_string(),
            Err(e) => failure(chat_user_id, e),
        }
    }

    /// `/me`: live profile fetched with the user's credential.
    pub async fn me(&self, chat_user_id: &str) -> String {
        let result = self
            .link_manager
            .with_credential(chat_user_id, |token| async move {
                self.github.fetch_profile(&token).await
            })
            .await;

        let profile = match flatten(result) {
            Ok(profile) => profile,
            Err(e) => return failure(chat_user_id, e),
        };

        let mut reply = format!("**GitHub Profile — {}**\n", profile.login);
        let _ = writeln!(reply, "{}", profile.bio.as_deref().unwrap_or("No bio"));
        let _ = writeln!(reply, "Name: {}", profile.name.as_deref().unwrap_or("N/A"));
        let _ = writeln!(
            reply,
            "Public Repos: {} | Followers: {} | Following: {}",
            profile.public_repos, profile.followers, profile.following
        );
        let _ = writeln!(reply, "Location: {}", profile.location.as_deref().unwrap_or("N/A"));
        if let Some(url) = profile.html_url {
            reply.push_str(&url);
        }
        reply.trim_end().to_string()
    }

    /// `/notifications`: most recent unread notifications.
    pub async fn notifications(&self, chat_user_id: &str) -> String {
        let result = self
            .link_manager
            .with_credential(chat_user_id, |token| async move {
                self.github
                    .fetch_notifications(&token, NOTIFICATION_LIMIT)
                    .await
            })
            .await;

        let notifications = match flatten(result) {
            Ok(notifications) => notifications,
            Err(e) => return failure(chat_user_id, e),
        };

        if notifications.is_empty() {
            return "📭 No unread notifications.".to_string();
        }

        let mut reply = String::from("**🔔 Notifications**\n");
        for n in &notifications {
            let repo = n
                .repository
                .as_ref()
                .map(|r| r.full_name.as_str())
                .unwrap_or("unknown");
            let _ = writeln!(
                reply,
                "• [{}] {} — {} ({})",
                repo, n.subject.title, n.subject.subject_type, n.reason
            );
        }
        reply.trim_end().to_string()
    }
}

/// Folds a provider failure inside a credential-scoped call into the link
/// taxonomy: a rejected credential means the user must relink, anything else
/// is a remote failure on an intact link.
fn flatten<T>(result: Result<Result<T, ProviderError>, LinkError>) -> Result<T, LinkError> {
    match result? {
        Ok(value) => Ok(value),
        Err(ProviderError::Unauthorized) => Err(LinkError::ReauthRequired),
        Err(e) => Err(LinkError::Remote(e)),
    }
}

fn failure(chat_user_id: &str, e: LinkError) -> String {
    match &e {
        LinkError::NotLinked => {}
        _ => warn!(chat_user_id = %chat_user_id, error = %e, "Command failed"),
    }
    format!("❌ {}", e.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::SqliteAccountStore;
    use crate::config::OAuthConfig;
    use crate::credentials::CredentialCipher;
    use crate::github::GitHubOAuth;
    use crate::link::{LinkOptions, StateManager};
    use mockito::{Mock, Server, ServerGuard};
    use secrecy::SecretString;
    use std::time::Duration;

    async fn handler_for(server: &ServerGuard) -> CommandHandler {
        let config = OAuthConfig {
            authorize_url: format!("{}/login/oauth/authorize", server.url()),
            token_url: format!("{}/login/oauth/access_token", server.url()),
            api_base_url: server.url(),
            ..OAuthConfig::default()
        };
        let provider = GitHubOAuth::new(
            &config,
            "client-123".to_string(),
            SecretString::from("shh".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let manager = LinkManager::new(
            Arc::new(CredentialCipher::from_key_bytes(&[1u8; 32]).unwrap()),
            Arc::new(SqliteAccountStore::new(":memory:", Duration::from_secs(5)).unwrap()),
            Arc::new(provider),
            StateManager::new(600),
            LinkOptions {
                callback_base_url: "https://bot.example.com".to_string(),
                require_state: true,
            },
        );

        CommandHandler::new(
            Arc::new(manager),
            GitHubClient::new(&server.url(), Duration::from_secs(5)).unwrap(),
        )
    }

    async fn link_user(server: &mut ServerGuard, handler: &CommandHandler) -> Vec<Mock> {
        let token_mock = server
            .mock("POST", "/login/oauth/access_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok123"}"#)
            .create_async()
            .await;
        let user_mock = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer tok123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":42,"login":"octo","name":"Octo Cat","html_url":"https://github.com/octo","public_repos":8,"followers":20,"following":1}"#,
            )
            .create_async()
            .await;

        handler
            .link_manager
            .complete_link("validcode", "user1")
            .await
            .unwrap();

        vec![token_mock, user_mock]
    }

    #[tokio::test]
    async fn test_auth_issues_link_then_reports_linked() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;

        let reply = handler.auth("user1").await;
        assert!(reply.starts_with("🔗"));
        assert!(reply.contains("client_id=client-123"));
        assert!(reply.contains("callback%3Fuser%3Duser1"));

        let _mocks = link_user(&mut server, &handler).await;

        let reply = handler.auth("user1").await;
        assert_eq!(reply, "✅ You are already linked to GitHub user: `octo`");
    }

    #[tokio::test]
    async fn test_unauth_twice() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;
        let _mocks = link_user(&mut server, &handler).await;

        assert_eq!(handler.unauth("user1").await, "✅ You have been unlinked from GitHub.");
        assert_eq!(
            handler.unauth("user1").await,
            "ℹ️ You were not linked to any GitHub account."
        );
    }

    #[tokio::test]
    async fn test_me_shows_profile() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;
        let _mocks = link_user(&mut server, &handler).await;

        let reply = handler.me("user1").await;
        assert!(reply.contains("GitHub Profile — octo"));
        assert!(reply.contains("Name: Octo Cat"));
        assert!(reply.contains("Public Repos: 8 | Followers: 20 | Following: 1"));
        assert!(reply.contains("Location: N/A"));
        assert!(!reply.contains("tok123"));
    }

    #[tokio::test]
    async fn test_me_when_not_linked() {
        let server = Server::new_async().await;
        let handler = handler_for(&server).await;

        let reply = handler.me("stranger").await;
        assert!(reply.contains("not linked"));
        assert!(reply.contains("/auth"));
    }

    #[tokio::test]
    async fn test_notifications_listing() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;
        let _mocks = link_user(&mut server, &handler).await;

        let _notifications = server
            .mock("GET", "/notifications?per_page=10")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{
                    "id": "1",
                    "reason": "review_requested",
                    "unread": true,
                    "updated_at": "2026-02-17T12:00:00Z",
                    "subject": {"title": "Add parser", "type": "PullRequest", "url": null},
                    "repository": {"full_name": "octo/repo"}
                }]"#,
            )
            .create_async()
            .await;

        let reply = handler.notifications("user1").await;
        assert!(reply.contains("[octo/repo] Add parser — PullRequest (review_requested)"));
    }

    #[tokio::test]
    async fn test_revoked_token_asks_for_relink() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;
        let _mocks = link_user(&mut server, &handler).await;

        let _notifications = server
            .mock("GET", "/notifications?per_page=10")
            .with_status(401)
            .create_async()
            .await;

        let reply = handler.notifications("user1").await;
        assert!(reply.contains("relink"));
    }

    #[tokio::test]
    async fn test_rate_limited_call_does_not_ask_for_relink() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;
        let _mocks = link_user(&mut server, &handler).await;

        let _notifications = server
            .mock("GET", "/notifications?per_page=10")
            .with_status(403)
            .with_header("X-RateLimit-Remaining", "0")
            .create_async()
            .await;

        let reply = handler.notifications("user1").await;
        assert_eq!(reply, "❌ GitHub rate limit reached. Please try again shortly.");
        assert!(handler.link_manager.status("user1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_server_error_does_not_ask_for_relink() {
        let mut server = Server::new_async().await;
        let handler = handler_for(&server).await;
        let _mocks = link_user(&mut server, &handler).await;

        let _notifications = server
            .mock("GET", "/notifications?per_page=10")
            .with_status(503)
            .create_async()
            .await;

        let reply = handler.notifications("user1").await;
        assert_eq!(reply, "❌ GitHub is unavailable right now. Please try again shortly.");
        assert!(!reply.contains("/auth"));
    }
}
