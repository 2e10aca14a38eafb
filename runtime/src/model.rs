// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared by the store, extractor, service and REST layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store key of the frequently-changing "current fixtures" snapshot.
pub const CURRENT_KEY: &str = "current";

/// One row of the upstream fixtures table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub number: String,
    pub home: String,
    pub away: String,
    pub result: String,
    pub status: String,
}

/// An entry of the week picker on the origin root page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekOption {
    pub date: String,
    pub label: String,
}

/// What a fetch hands back to callers. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub week: String,
    #[serde(rename = "fixtures")]
    pub records: Vec<ScheduleRecord>,
    #[serde(rename = "cached")]
    pub served_from_cache: bool,
}

/// A raw row of the cache table. The payload is opaque to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub last_fetched: DateTime<Utc>,
}

/// Records captured from one render, stamped with the capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub week: String,
    pub records: Vec<ScheduleRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn into_result(self, served_from_cache: bool) -> FetchResult {
        FetchResult {
            week: self.week,
            records: self.records,
            served_from_cache,
        }
    }
}

/// Typed cache payload, one variant per key class.
///
/// `Current` snapshots are subject to the freshness TTL; `Historical`
/// snapshots are valid forever once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePayload {
    Current(Snapshot),
    Historical(Snapshot),
}

impl CachePayload {
    pub fn into_snapshot(self) -> Snapshot {
        match self {
            Self::Current(s) | Self::Historical(s) => s,
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// Logical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Current,
    Date(String),
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Current => CURRENT_KEY,
            Self::Date(d) => d,
        }
    }
}

/// Outcome of week discovery. Keeps "nothing listed" apart from "could not look".
#[derive(Debug, Clone, PartialEq)]
pub enum WeekDiscovery {
    Available(Vec<WeekOption>),
    Empty,
    Failed { reason: String },
}

impl WeekDiscovery {
    pub fn from_options(options: Vec<WeekOption>) -> Self {
        if options.is_empty() {
            Self::Empty
        } else {
            Self::Available(options)
        }
    }

    /// Options found, or an empty list for `Empty` and `Failed`.
    pub fn options(&self) -> &[WeekOption] {
        match self {
            Self::Available(options) => options,
            Self::Empty | Self::Failed { .. } => &[],
        }
    }
}
