//! Browser-facing OAuth endpoints.
//!
//! 1. Chat command hands the user `GET /auth?user=<chat id>`
//! 2. `/auth` redirects to the provider's authorize page
//! 3. Provider redirects to `GET /callback?user=..&code=..&state=..`
//! 4. On success the browser lands on the static "complete" page with the
//!    remote username; on failure it gets a 400 with a short message

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::link::{LinkError, LinkManager, CORRELATION_PARAM};

/// Application error types for OAuth endpoints
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    ServerError(String),
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        (status, message).into_response()
    }
}

impl From<LinkError> for AppError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::AuthExchange(_) => AppError::BadRequest(
                "Failed to get token. Please run /auth again.".to_string(),
            ),
            LinkError::IdentityFetch(_) => AppError::BadRequest(
                "Failed to fetch user. Please run /auth again.".to_string(),
            ),
            LinkError::InvalidState => AppError::BadRequest(
                "This link has expired or was not issued to you. Please run /auth again."
                    .to_string(),
            ),
            LinkError::Store(_) | LinkError::Remote(_) => {
                AppError::Unavailable(e.user_message().to_string())
            }
            other => AppError::ServerError(other.user_message().to_string()),
        }
    }
}

/// Shared application state for OAuth API
#[derive(Clone)]
pub struct OAuthAppState {
    pub link_manager: Arc<LinkManager>,
    /// Static confirmation page shown after a successful link
    pub complete_url: String,
}

/// `GET /auth` query parameters
#[derive(Deserialize)]
pub struct AuthStart {
    user: Option<String>,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    user: Option<String>,
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Create OAuth API router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/auth", get(oauth_start))
        .route("/callback", get(oauth_callback))
        .with_state(Arc::new(state))
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing '{}' parameter", name)))
}

/// GET /auth
///
/// Redirects the browser to the provider's authorization page.
async fn oauth_start(
    State(state): State<Arc<OAuthAppState>>,
    Query(params): Query<AuthStart>,
) -> Result<Redirect, AppError> {
    let chat_user_id = required(params.user, CORRELATION_PARAM)?;

    let auth_url = state.link_manager.begin_link(&chat_user_id);

    info!(chat_user_id = %chat_user_id, "Redirecting to OAuth provider");
    Ok(Redirect::temporary(&auth_url))
}

/// GET /callback
///
/// Exchanges the authorization code, stores the sealed credential and sends
/// the browser to the confirmation page.
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Redirect, AppError> {
    if let Some(error) = callback.error {
        warn!(error = %error, "OAuth authorization failed at provider");
        return Err(AppError::BadRequest(format!(
            "Authorization failed ({}). Please run /auth again.",
            error
        )));
    }

    let chat_user_id = required(callback.user, CORRELATION_PARAM)?;
    let code = required(callback.code, "code")?;

    debug!(chat_user_id = %chat_user_id, "OAuth callback received");

    state
        .link_manager
        .verify_callback(callback.state.as_deref(), &chat_user_id)?;

    let account = state
        .link_manager
        .complete_link(&code, &chat_user_id)
        .await
        .map_err(|e| {
            error!(chat_user_id = %chat_user_id, error = %e, "Link attempt failed");
            AppError::from(e)
        })?;

    Ok(Redirect::to(&format!(
        "{}?user={}",
        state.complete_url,
        urlencoding::encode(&account.remote_username)
    )))
}
