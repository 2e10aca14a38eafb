// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-key in-flight call deduplication.
//!
//! The first caller for a key spawns the work; callers arriving while it runs
//! await the same shared future and receive a clone of its result, success or
//! failure. The work runs on its own task, so it completes even if every
//! caller goes away, and the task clears its own slot when it lands.

use crate::error::FetchError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

type Flight<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;
type Flights<T> = DashMap<String, (u64, Flight<T>)>;

pub struct SingleFlight<T> {
    flights: Arc<Flights<T>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

/// Removes a flight's slot when its task finishes, panics included.
struct Landing<T> {
    flights: Arc<Flights<T>>,
    key: String,
    id: u64,
}

impl<T> Drop for Landing<T> {
    fn drop(&mut self) {
        // A newer flight may already own the slot.
        self.flights
            .remove_if(&self.key, |_, (current, _)| *current == self.id);
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a flight for `key` is already airborne, in
    /// which case join it.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (flight, launch) = match self.flights.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!(key, "joining in-flight fetch");
                (existing.get().1.clone(), None)
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                let flight = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(FetchError::Internal("fetch task ended without a result".into()))
                    })
                }
                .boxed()
                .shared();
                slot.insert((id, flight.clone()));
                (flight, Some((id, tx)))
            }
        };

        // Spawned only after the slot is published and its lock released.
        if let Some((id, tx)) = launch {
            let landing = Landing {
                flights: Arc::clone(&self.flights),
                key: key.to_string(),
                id,
            };
            let work = work();
            tokio::spawn(async move {
                let result = work.await;
                drop(landing);
                let _ = tx.send(result);
            });
        }

        flight.await
    }

    /// Number of keys with a flight in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}
