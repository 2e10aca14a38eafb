// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cache store: a durable key → payload map with a freshness timestamp.
//!
//! Stores hold no policy. Deciding whether an entry is still usable is the
//! service's job; a store only reads rows and upserts them, refreshing
//! `last_fetched` on every write.

pub mod memory;
pub mod postgres;
pub mod sqlite;

use crate::error::StoreError;
use crate::model::CacheEntry;
use async_trait::async_trait;

pub use memory::MemoryCacheStore;
pub use postgres::{PgCacheStore, PgSettings, TlsMode};
pub use sqlite::SqliteCacheStore;

/// Backing store for cached fetch payloads.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up the entry for `key`. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or overwrite the entry for `key`, stamping it with the current time.
    ///
    /// Concurrent writers to the same key resolve last-writer-wins.
    async fn put(&self, key: &str, payload: &serde_json::Value) -> Result<(), StoreError>;

    /// Short backend name for logs and `doctor` output.
    fn backend(&self) -> &'static str;
}
