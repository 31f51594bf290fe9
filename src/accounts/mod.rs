//! Linked-account records and their persistence.
//!
//! One [`LinkedAccount`] per chat-platform user. Writes are whole-record
//! upserts or deletes keyed by `chat_user_id`; there is no field-level update,
//! so a concurrent reader sees either the old record or the new one.

mod storage;

pub use storage::SqliteAccountStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Link between a chat identity and a remote-API identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    /// Opaque chat-platform user id (unique key)
    pub chat_user_id: String,

    /// Remote identity, cached at link time
    pub remote_user_id: i64,
    pub remote_username: String,
    pub avatar_url: Option<String>,

    /// Sealed bearer credential. `None` means the record is unusable and is
    /// treated as "not linked".
    pub encrypted_credential: Option<String>,

    /// Creation or last successful re-link
    pub linked_at: DateTime<Utc>,
}

/// Persistent store failure. Transient from the caller's point of view.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account store did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistent key-value store of linked accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates the record or overwrites it in place.
    async fn upsert(&self, account: &LinkedAccount) -> Result<(), StoreError>;

    async fn find(&self, chat_user_id: &str) -> Result<Option<LinkedAccount>, StoreError>;

    /// Returns whether a record existed.
    async fn delete(&self, chat_user_id: &str) -> Result<bool, StoreError>;
}
