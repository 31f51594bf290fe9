// HTTP surface: OAuth redirect/callback and health

pub mod oauth;

pub use oauth::{create_oauth_router, AppError, OAuthAppState};

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Full application router
pub fn create_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(create_oauth_router(state))
        .layer(TraceLayer::new_for_http())
}
