//! SQLite-backed document store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.
//!
//! Each collection is one table holding a JSON body per document id.
//! Pipelines are evaluated in-process over the decoded documents.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use super::pipeline::{self, Stage};
use super::store::DocumentStore;
use crate::errors::StoreError;

/// Document store backed by a single SQLite database file.
pub struct SqliteDocumentStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
    /// Table holding this store's documents.
    collection: String,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str, collection: &str) -> Result<Self, StoreError> {
        validate_collection(collection)?;
        let conn = Connection::open(path).map_err(|e| StoreError::Connect {
            message: format!("{path}: {e}"),
        })?;
        let store = Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        store.ping()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the collection table if it does not already exist.
    /// This is idempotent -- safe to call on every startup.
    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {collection} (
                id          TEXT PRIMARY KEY,
                body        TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            ",
            collection = self.collection
        ))?;
        Ok(())
    }

    /// Round-trip a trivial query to prove the connection is usable.
    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Connect {
                message: format!("ping failed: {e}"),
            })?;
        Ok(())
    }

    fn load_documents(&self) -> Result<Vec<Value>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT body FROM {} ORDER BY id",
            self.collection
        ))?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}

/// Collection names are interpolated into SQL, so only identifiers pass.
fn validate_collection(collection: &str) -> Result<(), StoreError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Connect {
            message: format!("invalid collection name '{collection}'"),
        })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn replace_with_upsert(
        &self,
        key: &str,
        document: Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let body = serde_json::to_string(&document)?;
            let now = chrono::Utc::now().to_rfc3339();
            let conn = self.lock();
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, body, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                    self.collection
                ),
                params![key, body, now],
            )?;
            debug!("SQLite upsert: collection={} id={}", self.collection, key);
            Ok(())
        })
    }

    fn run_pipeline(
        &self,
        stages: &[Stage],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, StoreError>> + Send + '_>> {
        let stages = stages.to_vec();
        Box::pin(async move {
            let documents = self.load_documents()?;
            Ok(pipeline::run(documents, &stages))
        })
    }
}
