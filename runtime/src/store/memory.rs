// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process cache store, used for development runs and tests.

use super::CacheStore;
use crate::error::StoreError;
use crate::model::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Cache store backed by a concurrent hash map. Contents die with the process.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload an entry with an explicit fetch time.
    pub fn seed(&self, key: &str, payload: serde_json::Value, last_fetched: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                payload,
                last_fetched,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &str, payload: &serde_json::Value) -> Result<(), StoreError> {
        let now = Utc::now();
        self.entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.payload = payload.clone();
                e.last_fetched = e.last_fetched.max(now);
            })
            .or_insert_with(|| CacheEntry {
                key: key.to_string(),
                payload: payload.clone(),
                last_fetched: now,
            });
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store = MemoryCacheStore::new();
        assert!(store.get("current").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_refreshes_timestamp() {
        let store = MemoryCacheStore::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        store.seed("current", json!({"v": 1}), old);

        store.put("current", &json!({"v": 2})).await.unwrap();

        let entry = store.get("current").await.unwrap().unwrap();
        assert_eq!(entry.payload, json!({"v": 2}));
        assert!(entry.last_fetched > old);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_timestamp_never_moves_backwards() {
        let store = MemoryCacheStore::new();
        let future = Utc::now() + chrono::Duration::minutes(5);
        store.seed("k", json!(null), future);
        store.put("k", &json!(1)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap().last_fetched, future);
    }
}
