//! # Racetrack Store - Durable Local Storage
//!
//! Provides the persistence layer for the tracking engine: a small
//! key-value abstraction with a SQLite and an in-memory backend,
//! plus typed repositories for the session record and the offline
//! telemetry queue.

pub mod error;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use repository::*;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Key holding the offline telemetry queue
pub const QUEUE_KEY: &str = "racetrack.offline_queue";

/// Key holding the active tracking session record
pub const SESSION_KEY: &str = "racetrack.tracking_session";

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Durable string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    /// Delete `key`; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

// ============================================================================
// SQLITE BACKEND
// ============================================================================

/// Database file created inside the data directory
pub const DATABASE_FILE: &str = "racetrack.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
"#;

/// SQLite-backed store, one row per key in WAL mode.
///
/// The connection is used from blocking tasks so the async runtime never
/// waits on disk.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create `<data_dir>/racetrack.db`
    pub async fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;
        let path = data_dir.join(DATABASE_FILE);

        let conn = tokio::task::spawn_blocking(move || -> StoreResult<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            conn.execute_batch(SCHEMA)?;
            info!("SQLite store opened at {}", path.display());
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Volatile database for tests
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await?;
        Ok(result?)
    }
}

fn check_key(key: &str) -> StoreResult<()> {
    if key.trim().is_empty() {
        return Err(StoreError::invalid_key(key));
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        check_key(key)?;
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |r| r.get(0))
                .optional()
        })
        .await
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        check_key(key)?;
        let key = key.to_string();
        let bytes = value.len();
        let stored = key.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )
        })
        .await?;
        debug!("Stored {} ({} bytes)", stored, bytes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        check_key(key)?;
        let key = key.to_string();
        self.with_conn(move |conn| conn.execute("DELETE FROM kv WHERE key = ?1", params![key]))
            .await?;
        Ok(())
    }
}

// ============================================================================
// MEMORY BACKEND
// ============================================================================

/// Volatile backend for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Main storage client
pub struct StoreClient {
    kv: Arc<dyn KeyValueStore>,
    session_repo: SessionRepository,
    queue_repo: QueueRepository,
}

impl StoreClient {
    /// Open the SQLite store described by `config`
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&config.data_dir).await?);
        Ok(Self::with_backend(kv))
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryStore::new()))
    }

    pub fn with_backend(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            session_repo: SessionRepository::new(kv.clone()),
            queue_repo: QueueRepository::new(kv.clone()),
            kv,
        }
    }

    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        self.kv.clone()
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.session_repo
    }

    pub fn queue(&self) -> &QueueRepository {
        &self.queue_repo
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_upsert_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(store.get("alpha").await.unwrap(), None);

        store.set("alpha", "one".into()).await.unwrap();
        store.set("alpha", "two".into()).await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap().as_deref(), Some("two"));

        store.remove("alpha").await.unwrap();
        store.remove("alpha").await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteStore::open(dir.path()).await.unwrap();
            store.set(SESSION_KEY, "{}".into()).await.unwrap();
        }

        assert!(dir.path().join(DATABASE_FILE).exists());
        let reopened = SqliteStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(SESSION_KEY).await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_sqlite_store_rejects_blank_keys() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(matches!(
            store.set("  ", "x".into()).await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(store.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_client_opens_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = StoreClient::new(StoreConfig {
            data_dir: dir.path().join("nested"),
        })
        .await
        .unwrap();

        client.backend().set(QUEUE_KEY, "[]".into()).await.unwrap();
        assert_eq!(client.backend().get(QUEUE_KEY).await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.len(), 1);
        store.remove("k").await.unwrap();
        assert!(store.is_empty());
    }
}
