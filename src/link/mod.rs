//! Account linking over the OAuth 2.0 authorization-code flow.
//!
//! Lifecycle per chat user:
//! 1. `begin_link` → authorize URL carrying a single-use `state` token
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to `/callback?user=<chat id>&code=..&state=..`
//! 4. `verify_callback` consumes the token, `complete_link` exchanges the
//!    code, fetches the identity, seals the credential and upserts the record
//! 5. `get_credential` / `with_credential` open it per outbound call
//! 6. `unlink` hard-deletes the record
//!
//! Pending authorizations are never persisted; re-authorizing an already
//! linked user overwrites the record in place.

mod state_manager;


pub use state_manager::{run_state_cleanup, StateEntry, StateManager};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::accounts::{AccountStore, LinkedAccount, StoreError};
use crate::credentials::{BearerToken, CredentialCipher, CryptoError};
use crate::github::{OAuthProvider, ProviderError, RemoteIdentity};

/// Query parameter carrying the chat user id on the callback URI
pub const CORRELATION_PARAM: &str = "user";

/// Link manager failure. Every variant is safe to log; none carries a
/// credential.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("authorization code exchange failed: {0}")]
    AuthExchange(#[source] ProviderError),
    #[error("remote identity lookup failed: {0}")]
    IdentityFetch(#[source] ProviderError),
    #[error("callback state is missing, expired or bound to another user")]
    InvalidState,
    #[error("provider call with stored credential failed: {0}")]
    Remote(#[source] ProviderError),
    #[error("no linked account")]
    NotLinked,
    #[error("stored credential can no longer be used; relink required")]
    ReauthRequired,
    #[error("failed to seal credential: {0}")]
    Crypto(#[from] CryptoError),
    #[error("account store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl LinkError {
    /// Short instruction for the chat user.
    pub fn user_message(&self) -> &'static str {
        match self {
            LinkError::AuthExchange(_)
            | LinkError::IdentityFetch(_)
            | LinkError::InvalidState
            | LinkError::Crypto(_) => {
                "Linking your GitHub account failed. Please run `/auth` again."
            }
            LinkError::Remote(ProviderError::RateLimited(_)) => {
                "GitHub rate limit reached. Please try again shortly."
            }
            LinkError::Remote(_) => "GitHub is unavailable right now. Please try again shortly.",
            LinkError::NotLinked => {
                "You are not linked to any GitHub account. Use `/auth` to link your account."
            }
            LinkError::ReauthRequired => {
                "Your GitHub authorization is no longer valid. Please relink with `/auth`."
            }
            LinkError::Store(_) => {
                "Account storage is temporarily unavailable. Please try again shortly."
            }
        }
    }

    /// Whether the same request may succeed if the user retries it.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::AuthExchange(e) | LinkError::IdentityFetch(e) | LinkError::Remote(e) => {
                e.is_transient()
            }
            LinkError::Store(_) => true,
            _ => false,
        }
    }
}

/// Link manager policy
#[derive(Clone, Debug)]
pub struct LinkOptions {
    /// Public base URL of this service, without trailing slash
    pub callback_base_url: String,
    /// Reject callbacks without a live `state` token bound to the user
    pub require_state: bool,
}

/// Owns every read and write of [`LinkedAccount`] records.
///
/// Built once at startup from explicit dependencies and shared behind an
/// `Arc`; holds no per-user mutable state besides pending state tokens.
pub struct LinkManager {
    cipher: Arc<CredentialCipher>,
    store: Arc<dyn AccountStore>,
    provider: Arc<dyn OAuthProvider>,
    states: StateManager,
    options: LinkOptions,
}

impl LinkManager {
    pub fn new(
        cipher: Arc<CredentialCipher>,
        store: Arc<dyn AccountStore>,
        provider: Arc<dyn OAuthProvider>,
        states: StateManager,
        options: LinkOptions,
    ) -> Self {
        Self {
            cipher,
            store,
            provider,
            states,
            options,
        }
    }

    pub fn states(&self) -> &StateManager {
        &self.states
    }

    /// Callback URI registered with the provider for `chat_user_id`.
    pub fn callback_uri(&self, chat_user_id: &str) -> String {
        format!(
            "{}/callback?{}={}",
            self.options.callback_base_url,
            CORRELATION_PARAM,
            urlencoding::encode(chat_user_id)
        )
    }

    /// Builds the provider's authorization URL for `chat_user_id`.
    ///
    /// Any number of these may be outstanding per user; the first valid
    /// callback wins.
    pub fn begin_link(&self, chat_user_id: &str) -> String {
        let state = self.states.create_state(chat_user_id);
        let url = self
            .provider
            .authorize_url(&state, &self.callback_uri(chat_user_id));

        debug!(chat_user_id = %chat_user_id, "Issued authorization URL");
        url
    }

    /// Checks that a callback was initiated by `begin_link` for the same user.
    ///
    /// The token is consumed whether or not it matches.
    pub fn verify_callback(
        &self,
        state: Option<&str>,
        chat_user_id: &str,
    ) -> Result<(), LinkError> {
        let entry = state.and_then(|s| self.states.validate_and_consume(s));

        if !self.options.require_state {
            return Ok(());
        }

        match entry {
            Some(entry) if entry.chat_user_id == chat_user_id => Ok(()),
            Some(entry) => {
                warn!(
                    expected = %entry.chat_user_id,
                    actual = %chat_user_id,
                    "OAuth state bound to a different user"
                );
                Err(LinkError::InvalidState)
            }
            None => {
                warn!(chat_user_id = %chat_user_id, "Missing, unknown or expired OAuth state");
                Err(LinkError::InvalidState)
            }
        }
    }

    /// Completes the handshake: exchange → identity → seal → upsert.
    ///
    /// Nothing is written unless every earlier step succeeded, and the record
    /// is written in a single upsert, so a failed attempt leaves any previous
    /// link untouched.
    pub async fn complete_link(
        &self,
        code: &str,
        chat_user_id: &str,
    ) -> Result<LinkedAccount, LinkError> {
        let token = self
            .provider
            .exchange_code(code, &self.callback_uri(chat_user_id))
            .await
            .map_err(|e| {
                warn!(chat_user_id = %chat_user_id, error = %e, "Token exchange failed");
                LinkError::AuthExchange(e)
            })?;

        let identity = self.provider.fetch_identity(&token).await.map_err(|e| {
            warn!(chat_user_id = %chat_user_id, error = %e, "Identity fetch failed");
            LinkError::IdentityFetch(e)
        })?;

        let account = self.seal_account(chat_user_id, &token, identity)?;
        self.store.upsert(&account).await?;

        info!(
            chat_user_id = %chat_user_id,
            remote_username = %account.remote_username,
            "Account linked"
        );

        Ok(account)
    }

    /// Opens the stored credential for one outbound call.
    ///
    /// `NotLinked` when there is no usable record; `ReauthRequired` when a
    /// record exists but its credential cannot be decrypted.
    pub async fn get_credential(&self, chat_user_id: &str) -> Result<BearerToken, LinkError> {
        let account = self.store.find(chat_user_id).await?;

        let Some(sealed) = account.and_then(|a| a.encrypted_credential) else {
            return Err(LinkError::NotLinked);
        };

        self.open(chat_user_id, &sealed)
    }

    /// Runs `f` with the decrypted credential; the token is dropped as soon
    /// as the future completes.
    pub async fn with_credential<F, Fut, T>(
        &self,
        chat_user_id: &str,
        f: F,
    ) -> Result<T, LinkError>
    where
        F: FnOnce(BearerToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.get_credential(chat_user_id).await?;
        Ok(f(token).await)
    }

    /// Stored record without decrypting anything.
    pub async fn status(&self, chat_user_id: &str) -> Result<Option<LinkedAccount>, LinkError> {
        let account = self.store.find(chat_user_id).await?;
        Ok(account.filter(|a| a.encrypted_credential.is_some()))
    }

    /// Re-fetches the remote identity and rewrites the cached profile fields.
    pub async fn refresh_profile(&self, chat_user_id: &str) -> Result<LinkedAccount, LinkError> {
        let token = self.get_credential(chat_user_id).await?;

        let identity = match self.provider.fetch_identity(&token).await {
            Ok(identity) => identity,
            Err(ProviderError::Unauthorized) => {
                info!(chat_user_id = %chat_user_id, "Stored credential was revoked");
                return Err(LinkError::ReauthRequired);
            }
            Err(e) => return Err(LinkError::Remote(e)),
        };

        let account = self.seal_account(chat_user_id, &token, identity)?;
        self.store.upsert(&account).await?;

        debug!(chat_user_id = %chat_user_id, "Profile refreshed");
        Ok(account)
    }

    /// Hard-deletes the record. Returns whether one existed.
    pub async fn unlink(&self, chat_user_id: &str) -> Result<bool, LinkError> {
        let removed = self.store.delete(chat_user_id).await?;
        info!(chat_user_id = %chat_user_id, removed, "Unlink requested");
        Ok(removed)
    }

    fn seal_account(
        &self,
        chat_user_id: &str,
        token: &BearerToken,
        identity: RemoteIdentity,
    ) -> Result<LinkedAccount, LinkError> {
        let encrypted_credential = self.cipher.encrypt(token.expose())?;

        Ok(LinkedAccount {
            chat_user_id: chat_user_id.to_string(),
            remote_user_id: identity.id,
            remote_username: identity.login,
            avatar_url: identity.avatar_url,
            encrypted_credential: Some(encrypted_credential),
            linked_at: Utc::now(),
        })
    }

    fn open(&self, chat_user_id: &str, sealed: &str) -> Result<BearerToken, LinkError> {
        self.cipher.decrypt(sealed).map(BearerToken::new).map_err(|e| {
            warn!(chat_user_id = %chat_user_id, error = %e, "Stored credential failed to decrypt");
            LinkError::ReauthRequired
        })
    }
}
