// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the fetch pipeline.
//!
//! Every variant carries owned strings so errors are `Clone`: one failed
//! render is handed to every caller waiting on the same key.

use thiserror::Error;

/// Failure talking to the persistence layer.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("cache store connection failed: {0}")]
    Connection(String),
    #[error("cache store query failed: {0}")]
    Query(String),
    #[error("cache payload for `{key}` could not be encoded or decoded: {reason}")]
    Payload { key: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Query(e.to_string())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        if e.is_closed() {
            Self::Connection(e.to_string())
        } else {
            Self::Query(e.to_string())
        }
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Failure obtaining rendered HTML from the origin.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("navigation to {url} timed out after {after_ms}ms")]
    Timeout { url: String, after_ms: u64 },
    #[error("browser automation fault: {0}")]
    Automation(String),
    #[error("origin renders suspended after repeated failures; retry in {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },
}

impl RenderError {
    /// Whether another attempt has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::Timeout { .. })
    }
}

/// Failure of a top-level fetch operation.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("invalid fixture date `{0}`")]
    InvalidDate(String),
    #[error("fetch task failed: {0}")]
    Internal(String),
}
