//! Pending OAuth correlation tokens.
//!
//! A token is issued per `begin_link`, bound to the chat user that asked for
//! it, and consumed by the first callback that presents it.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Pending authorization bound to a chat user
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub chat_user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Default cap on outstanding tokens per chat user
pub const DEFAULT_MAX_PENDING_PER_USER: usize = 5;

/// Default cap on outstanding tokens overall
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// In-memory state tokens with expiry. Cheap to clone; clones share the map.
///
/// The map is bounded: issuing past a cap evicts the oldest token, first among
/// the same user's tokens, then across all users.
#[derive(Clone)]
pub struct StateManager {
    states: Arc<DashMap<String, StateEntry>>,
    expiry_duration: Duration,
    max_per_user: usize,
    max_pending: usize,
}

impl StateManager {
    /// Create a new state manager with the default caps
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long a token remains valid
    pub fn new(expiry_seconds: i64) -> Self {
        Self::with_limits(expiry_seconds, DEFAULT_MAX_PENDING_PER_USER, DEFAULT_MAX_PENDING)
    }

    pub fn with_limits(expiry_seconds: i64, max_per_user: usize, max_pending: usize) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            expiry_duration: Duration::seconds(expiry_seconds),
            max_per_user: max_per_user.max(1),
            max_pending: max_pending.max(1),
        }
    }

    /// Generate a new random token bound to `chat_user_id`
    pub fn create_state(&self, chat_user_id: &str) -> String {
        self.make_room(chat_user_id);

        let state = Uuid::new_v4().simple().to_string();
        self.states.insert(
            state.clone(),
            StateEntry {
                chat_user_id: chat_user_id.to_string(),
                created_at: Utc::now(),
            },
        );
        state
    }

    /// Validate and consume a token.
    ///
    /// Returns the entry if it exists and has not expired. The token is
    /// removed either way (single-use).
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let (_, entry) = self.states.remove(state)?;

        if Utc::now() - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Evicts so that one more token for `chat_user_id` fits under both caps.
    fn make_room(&self, chat_user_id: &str) {
        let mut own: Vec<(String, DateTime<Utc>)> = self
            .states
            .iter()
            .filter(|e| e.chat_user_id == chat_user_id)
            .map(|e| (e.key().clone(), e.created_at))
            .collect();

        if own.len() >= self.max_per_user {
            own.sort_by_key(|(_, created_at)| *created_at);
            for (state, _) in own.iter().take(own.len() + 1 - self.max_per_user) {
                self.states.remove(state);
            }
        }

        if self.states.len() < self.max_pending {
            return;
        }

        self.cleanup_expired();
        while self.states.len() >= self.max_pending {
            let oldest = self
                .states
                .iter()
                .min_by_key(|e| e.created_at)
                .map(|e| e.key().clone());
            let Some(oldest) = oldest else { break };
            self.states.remove(&oldest);
            tracing::warn!(
                max_pending = self.max_pending,
                "Pending OAuth states at capacity, evicted oldest"
            );
        }
    }

    /// Drop expired tokens
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.states
            .retain(|_, entry| now - entry.created_at <= self.expiry_duration);
    }

    /// Count of outstanding tokens
    pub fn count(&self) -> usize {
        self.states.len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let period = std::time::Duration::from_secs(interval_seconds.max(1));
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(remaining = manager.count(), "OAuth state cleanup complete");
    }
}
