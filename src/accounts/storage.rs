//! Linked-account persistence using SQLite.
//!
//! Only ciphertext reaches this layer; sealing and opening happen in the
//! link manager.

use super::{AccountStore, LinkedAccount, StoreError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Linked-account storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE linked_accounts (
///     chat_user_id         TEXT PRIMARY KEY,
///     remote_user_id       INTEGER NOT NULL,
///     remote_username      TEXT NOT NULL,
///     avatar_url           TEXT,
///     encrypted_credential TEXT,          -- AES-256-GCM envelope
///     linked_at            TEXT NOT NULL  -- RFC 3339
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex and only touched from blocking tasks
/// - Every call is bounded by `op_timeout`
#[derive(Clone)]
pub struct SqliteAccountStore {
    conn: Arc<Mutex<Connection>>,
    op_timeout: Duration,
}

impl SqliteAccountStore {
    /// Opens (or creates) the database and ensures the table exists.
    ///
    /// Accepts a plain path, `:memory:`, or a `sqlite://` URL.
    pub fn new(database_url: &str, op_timeout: Duration) -> Result<Self> {
        let path = database_url
            .strip_prefix("sqlite://")
            .unwrap_or(database_url);

        let conn = Connection::open(Path::new(path))
            .with_context(|| format!("Failed to open account database at {}", path))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS linked_accounts (
                chat_user_id         TEXT PRIMARY KEY,
                remote_user_id       INTEGER NOT NULL,
                remote_username      TEXT NOT NULL,
                avatar_url           TEXT,
                encrypted_credential TEXT,
                linked_at            TEXT NOT NULL
            );",
        )
        .context("Failed to create linked_accounts table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout,
        })
    }

    /// Runs `op` against the connection on the blocking pool, bounded by the
    /// store timeout.
    ///
    /// A timeout only abandons the wait: the blocking closure keeps running and
    /// may still commit after the caller saw `StoreError::Timeout`. Every write
    /// is a whole-record upsert or delete keyed by chat user id, so repeating it
    /// on retry converges to the same row.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("account store connection lock poisoned"))?;
            op(&*guard)
        });

        match tokio::time::timeout(self.op_timeout, task).await {
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
            Ok(Err(join_err)) => Err(StoreError::Backend(anyhow!(
                "account store task failed: {}",
                join_err
            ))),
            Ok(Ok(result)) => result.map_err(StoreError::Backend),
        }
    }
}

fn upsert_row(conn: &Connection, account: &LinkedAccount) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO linked_accounts (
            chat_user_id, remote_user_id, remote_username,
            avatar_url, encrypted_credential, linked_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(chat_user_id) DO UPDATE SET
            remote_user_id = excluded.remote_user_id,
            remote_username = excluded.remote_username,
            avatar_url = excluded.avatar_url,
            encrypted_credential = excluded.encrypted_credential,
            linked_at = excluded.linked_at
        "#,
        params![
            account.chat_user_id,
            account.remote_user_id,
            account.remote_username,
            account.avatar_url,
            account.encrypted_credential,
            account.linked_at.to_rfc3339(),
        ],
    )
    .context("Failed to upsert linked account")?;
    Ok(())
}

fn find_row(conn: &Connection, chat_user_id: &str) -> Result<Option<LinkedAccount>> {
    let row = conn
        .query_row(
            r#"
            SELECT chat_user_id, remote_user_id, remote_username,
                   avatar_url, encrypted_credential, linked_at
            FROM linked_accounts
            WHERE chat_user_id = ?1
            "#,
            params![chat_user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .context("Failed to query linked account")?;

    let Some((
        chat_user_id,
        remote_user_id,
        remote_username,
        avatar_url,
        encrypted_credential,
        linked_at,
    )) = row
    else {
        return Ok(None);
    };

    let linked_at = DateTime::parse_from_rfc3339(&linked_at)
        .map(|dt| dt.with_timezone(&Utc))
        .context("Failed to parse linked_at timestamp")?;

    Ok(Some(LinkedAccount {
        chat_user_id,
        remote_user_id,
        remote_username,
        avatar_url,
        encrypted_credential,
        linked_at,
    }))
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn upsert(&self, account: &LinkedAccount) -> Result<(), StoreError> {
        let account = account.clone();
        self.run(move |conn| upsert_row(conn, &account)).await
    }

    async fn find(&self, chat_user_id: &str) -> Result<Option<LinkedAccount>, StoreError> {
        let chat_user_id = chat_user_id.to_string();
        self.run(move |conn| find_row(conn, &chat_user_id)).await
    }

    async fn delete(&self, chat_user_id: &str) -> Result<bool, StoreError> {
        let chat_user_id = chat_user_id.to_string();
        self.run(move |conn| {
            let rows_affected = conn
                .execute(
                    "DELETE FROM linked_accounts WHERE chat_user_id = ?1",
                    params![chat_user_id],
                )
                .context("Failed to delete linked account")?;
            Ok(rows_affected > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteAccountStore {
        SqliteAccountStore::new(":memory:", Duration::from_secs(5))
            .expect("Failed to create test store")
    }

    fn account(chat_user_id: &str, login: &str) -> LinkedAccount {
        LinkedAccount {
            chat_user_id: chat_user_id.to_string(),
            remote_user_id: 42,
            remote_username: login.to_string(),
            avatar_url: Some(format!("https://avatars.example.com/{}", login)),
            encrypted_credential: Some("c2VhbGVk".to_string()),
            linked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let store = create_test_store();
        let record = account("user1", "octo");

        store.upsert(&record).await.expect("Failed to upsert");

        let found = store
            .find("user1")
            .await
            .expect("Failed to find")
            .expect("Account not found");
        assert_eq!(found.remote_username, "octo");
        assert_eq!(found.remote_user_id, 42);
        assert_eq!(found.encrypted_credential, record.encrypted_credential);
        assert_eq!(found.linked_at.timestamp(), record.linked_at.timestamp());
    }

    #[tokio::test]
    async fn test_find_nonexistent() {
        let store = create_test_store();
        assert!(store.find("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let store = create_test_store();
        store.upsert(&account("user1", "octo")).await.unwrap();

        let mut relinked = account("user1", "octo2");
        relinked.avatar_url = None;
        relinked.encrypted_credential = Some("bmV3".to_string());
        store.upsert(&relinked).await.unwrap();

        let found = store.find("user1").await.unwrap().unwrap();
        assert_eq!(found.remote_username, "octo2");
        assert_eq!(found.avatar_url, None);
        assert_eq!(found.encrypted_credential.as_deref(), Some("bmV3"));

        let count: i64 = store
            .run(|conn| {
                conn.query_row("SELECT COUNT(*) FROM linked_accounts", [], |row| row.get(0))
                    .context("count")
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = create_test_store();
        store.upsert(&account("user1", "octo")).await.unwrap();

        assert!(store.delete("user1").await.unwrap());
        assert!(store.find("user1").await.unwrap().is_none());
        assert!(!store.delete("user1").await.unwrap());
    }

    #[tokio::test]
    async fn test_records_are_isolated_per_user() {
        let store = create_test_store();
        store.upsert(&account("user1", "octo")).await.unwrap();
        store.upsert(&account("user2", "hubot")).await.unwrap();

        store.delete("user1").await.unwrap();

        let other = store.find("user2").await.unwrap().unwrap();
        assert_eq!(other.remote_username, "hubot");
    }

    #[tokio::test]
    async fn test_missing_credential_column_round_trips_as_none() {
        let store = create_test_store();
        let mut record = account("user1", "octo");
        record.encrypted_credential = None;
        store.upsert(&record).await.unwrap();

        let found = store.find("user1").await.unwrap().unwrap();
        assert!(found.encrypted_credential.is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("accounts.db").display());

        {
            let store = SqliteAccountStore::new(&url, Duration::from_secs(5)).unwrap();
            store.upsert(&account("user1", "octo")).await.unwrap();
        }

        let reopened = SqliteAccountStore::new(&url, Duration::from_secs(5)).unwrap();
        let found = reopened.find("user1").await.unwrap().unwrap();
        assert_eq!(found.remote_username, "octo");
    }

    #[tokio::test]
    async fn test_busy_connection_times_out() {
        let store = SqliteAccountStore::new(":memory:", Duration::from_millis(50)).unwrap();

        let guard = store.conn.lock().unwrap();
        let err = store.upsert(&account("user1", "octo")).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(matches!(store.find("user1").await, Err(StoreError::Timeout(_))));
        drop(guard);

        // The abandoned upsert may still land; repeating it leaves one row.
        let patient = SqliteAccountStore {
            conn: Arc::clone(&store.conn),
            op_timeout: Duration::from_secs(5),
        };
        patient.upsert(&account("user1", "octo")).await.unwrap();

        let count: i64 = patient
            .run(|conn| {
                conn.query_row("SELECT COUNT(*) FROM linked_accounts", [], |row| row.get(0))
                    .context("count")
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unopenable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("accounts.db");
        assert!(SqliteAccountStore::new(path.to_str().unwrap(), Duration::from_secs(1)).is_err());
    }
}
