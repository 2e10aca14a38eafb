// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQLite cache store for single-node deployments and local runs.

use super::CacheStore;
use crate::error::StoreError;
use crate::model::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    last_fetched INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
);";

/// Cache store backed by a single SQLite connection.
///
/// Statements run on the blocking pool; the connection is serialized behind
/// a mutex, so every call is one atomic statement.
pub struct SqliteCacheStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open or create the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let db = Connection::open(path).map_err(|e| {
            StoreError::Connection(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::init(db)
    }

    /// Open a private, non-persistent database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("failed to open in-memory db: {e}")))?;
        Self::init(db)
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| StoreError::Connection("sqlite connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Connection(format!("sqlite task failed: {e}")))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |db| {
            let mut stmt =
                db.prepare("SELECT payload, last_fetched FROM cache_entries WHERE key = ?1")?;
            let row = stmt.query_row(rusqlite::params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            });

            let (raw, millis) = match row {
                Ok(r) => r,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let payload = serde_json::from_str(&raw).map_err(|e| StoreError::Payload {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            let last_fetched =
                DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                    StoreError::Payload {
                        key: key.clone(),
                        reason: format!("timestamp {millis} out of range"),
                    }
                })?;

            Ok(Some(CacheEntry {
                key,
                payload,
                last_fetched,
            }))
        })
        .await
    }

    async fn put(&self, key: &str, payload: &serde_json::Value) -> Result<(), StoreError> {
        let key = key.to_string();
        let raw = payload.to_string();
        let now = Utc::now().timestamp_millis();
        self.with_conn(move |db| {
            db.execute(
                "INSERT INTO cache_entries (key, payload, last_fetched) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    payload = excluded.payload,
                    last_fetched = MAX(cache_entries.last_fetched, excluded.last_fetched)",
                rusqlite::params![key, raw, now],
            )?;
            Ok(())
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
