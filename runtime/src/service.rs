// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fetch orchestration: cache-through retrieval of fixture pages.
//!
//! Three operations with three caching policies:
//!
//! - [`FixtureService::fetch_current`] serves the "current" snapshot while it
//!   is younger than the TTL and re-renders the origin once it expires.
//! - [`FixtureService::fetch_by_date`] renders a date page once; any stored
//!   snapshot for that date is served forever after.
//! - [`FixtureService::list_available_weeks`] always renders live and never
//!   touches the cache.
//!
//! Refetches for one key are deduplicated through [`SingleFlight`], so a
//! burst of callers against a cold or stale key costs a single render.

use crate::error::FetchError;
use crate::extract::Extractor;
use crate::model::{CacheKey, CachePayload, FetchResult, Snapshot, WeekDiscovery};
use crate::renderer::Renderer;
use crate::singleflight::SingleFlight;
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default freshness of the "current" snapshot.
pub const DEFAULT_CURRENT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default date page URL. `{origin}` and `{date}` are substituted.
pub const DEFAULT_DATE_URL_TEMPLATE: &str = "{origin}?date={date}";

/// Week label used when the origin page does not mark a selected week.
pub const CURRENT_WEEK_LABEL: &str = "current";

/// Orchestration policy knobs.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub origin_url: String,
    pub date_url_template: String,
    pub current_ttl: Duration,
    /// Serve an expired "current" snapshot when a refresh render fails.
    pub serve_stale_on_error: bool,
}

impl ServiceSettings {
    pub fn new(origin_url: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            date_url_template: DEFAULT_DATE_URL_TEMPLATE.to_string(),
            current_ttl: DEFAULT_CURRENT_TTL,
            serve_stale_on_error: false,
        }
    }
}

/// A decoded cache row.
struct Cached {
    snapshot: Snapshot,
    last_fetched: DateTime<Utc>,
}

/// The fetch orchestrator. Cheap to clone; clones share the store, renderer
/// and in-flight table.
#[derive(Clone)]
pub struct FixtureService {
    store: Arc<dyn CacheStore>,
    renderer: Arc<dyn Renderer>,
    extractor: Arc<Extractor>,
    settings: Arc<ServiceSettings>,
    flights: Arc<SingleFlight<FetchResult>>,
}

impl FixtureService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        renderer: Arc<dyn Renderer>,
        extractor: Extractor,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            renderer,
            extractor: Arc::new(extractor),
            settings: Arc::new(settings),
            flights: Arc::new(SingleFlight::new()),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Current fixtures, served from cache while fresh.
    pub async fn fetch_current(&self) -> Result<FetchResult, FetchError> {
        if let Some(cached) = self.load(&CacheKey::Current).await {
            if is_fresh(cached.last_fetched, Utc::now(), self.settings.current_ttl) {
                debug!(key = CacheKey::Current.as_str(), "cache hit");
                return Ok(cached.snapshot.into_result(true));
            }
        }

        let this = self.clone();
        self.flights
            .run(CacheKey::Current.as_str(), move || async move {
                this.refresh_current().await
            })
            .await
    }

    /// Fixtures for a past week. A stored snapshot never expires.
    pub async fn fetch_by_date(&self, date: &str) -> Result<FetchResult, FetchError> {
        let date = date.trim();
        if !is_valid_date_key(date) {
            return Err(FetchError::InvalidDate(date.to_string()));
        }
        let key = CacheKey::Date(date.to_string());

        if let Some(cached) = self.load(&key).await {
            debug!(key = key.as_str(), "cache hit");
            return Ok(cached.snapshot.into_result(true));
        }

        let this = self.clone();
        let flight_key = key.as_str().to_string();
        self.flights
            .run(&flight_key, move || async move { this.refresh_date(key).await })
            .await
    }

    /// Weeks offered by the origin's week picker, rendered live.
    pub async fn list_available_weeks(&self) -> WeekDiscovery {
        let url = &self.settings.origin_url;
        match self
            .renderer
            .render(url, Some(self.extractor.week_selector()))
            .await
        {
            Ok(html) => {
                let discovery = WeekDiscovery::from_options(self.extractor.week_options(&html));
                if matches!(discovery, WeekDiscovery::Empty) {
                    info!(url = url.as_str(), "week picker listed no dated options");
                }
                discovery
            }
            Err(e) => {
                error!(url = url.as_str(), "week discovery failed: {e}");
                WeekDiscovery::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// URL of the results page for `date`.
    pub fn date_url(&self, date: &str) -> String {
        self.settings
            .date_url_template
            .replace("{origin}", &self.settings.origin_url)
            .replace("{date}", date)
    }

    async fn refresh_current(&self) -> Result<FetchResult, FetchError> {
        let key = CacheKey::Current;
        // Another flight may have refreshed the key while this one was queued.
        let cached = self.load(&key).await;
        if let Some(c) = &cached {
            if is_fresh(c.last_fetched, Utc::now(), self.settings.current_ttl) {
                return Ok(c.snapshot.clone().into_result(true));
            }
        }

        let url = self.settings.origin_url.clone();
        let html = match self.render(&url).await {
            Ok(html) => html,
            Err(e) => {
                return match cached {
                    Some(stale) if self.settings.serve_stale_on_error => {
                        warn!(
                            key = key.as_str(),
                            age_secs = Utc::now()
                                .signed_duration_since(stale.last_fetched)
                                .num_seconds(),
                            "render failed, serving stale snapshot: {e}"
                        );
                        Ok(stale.snapshot.into_result(true))
                    }
                    _ => Err(e),
                };
            }
        };

        let week = self
            .extractor
            .selected_week(&html)
            .unwrap_or_else(|| CURRENT_WEEK_LABEL.to_string());
        let snapshot = self.snapshot(week, &html);
        self.persist(&key, CachePayload::Current(snapshot.clone())).await;
        Ok(snapshot.into_result(false))
    }

    async fn refresh_date(&self, key: CacheKey) -> Result<FetchResult, FetchError> {
        if let Some(cached) = self.load(&key).await {
            return Ok(cached.snapshot.into_result(true));
        }

        let date = key.as_str().to_string();
        let html = self.render(&self.date_url(&date)).await?;
        let snapshot = self.snapshot(date, &html);
        self.persist(&key, CachePayload::Historical(snapshot.clone()))
            .await;
        Ok(snapshot.into_result(false))
    }

    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let started = Instant::now();
        let html = self
            .renderer
            .render(url, Some(self.extractor.table_selector()))
            .await?;
        info!(
            url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = html.len(),
            "rendered origin page"
        );
        Ok(html)
    }

    fn snapshot(&self, week: String, html: &str) -> Snapshot {
        Snapshot {
            week,
            records: self.extractor.records(html),
            fetched_at: Utc::now(),
        }
    }

    /// Read and decode the entry for `key`. Store faults and payloads of the
    /// wrong shape count as a miss.
    async fn load(&self, key: &CacheKey) -> Option<Cached> {
        let entry = match self.store.get(key.as_str()).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(key = key.as_str(), "cache read failed, treating as miss: {e}");
                return None;
            }
        };

        let payload = match CachePayload::from_value(&entry.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = key.as_str(), "undecodable cache payload, treating as miss: {e}");
                return None;
            }
        };

        let matches_key = matches!(
            (key, &payload),
            (CacheKey::Current, CachePayload::Current(_))
                | (CacheKey::Date(_), CachePayload::Historical(_))
        );
        if !matches_key {
            warn!(key = key.as_str(), "cache payload kind does not match key, treating as miss");
            return None;
        }

        Some(Cached {
            snapshot: payload.into_snapshot(),
            last_fetched: entry.last_fetched,
        })
    }

    /// Write-through. Failures are logged; the caller still gets its data.
    async fn persist(&self, key: &CacheKey, payload: CachePayload) {
        let value = match payload.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key.as_str(), "cache payload encoding failed: {e}");
                return;
            }
        };
        if let Err(e) = self.store.put(key.as_str(), &value).await {
            warn!(key = key.as_str(), "cache write failed: {e}");
        }
    }
}

/// Whether an entry written at `last_fetched` is still fresh at `now`.
///
/// Entries stamped in the future (clock skew between writers) count as fresh.
pub fn is_fresh(last_fetched: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let age = now.signed_duration_since(last_fetched);
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => age < ttl,
        Err(_) => true,
    }
}

/// Whether `date` is acceptable as a historical cache key.
pub fn is_valid_date_key(date: &str) -> bool {
    static DATE_KEY: OnceLock<Option<Regex>> = OnceLock::new();
    DATE_KEY
        .get_or_init(|| Regex::new(r"^[0-9]{1,4}([-./][0-9]{1,4}){1,2}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::store::MemoryCacheStore;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Renderer for Unreachable {
        async fn render(&self, url: &str, _sel: Option<&str>) -> Result<String, RenderError> {
            Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            })
        }
    }

    fn service(store: Arc<MemoryCacheStore>) -> FixtureService {
        FixtureService::new(
            store,
            Arc::new(Unreachable),
            Extractor::default(),
            ServiceSettings::new("https://fixtures.example/"),
        )
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let ttl = Duration::from_secs(600);
        assert!(is_fresh(now - chrono::Duration::seconds(599), now, ttl));
        assert!(!is_fresh(now - chrono::Duration::seconds(600), now, ttl));
        assert!(!is_fresh(now - chrono::Duration::seconds(601), now, ttl));
        assert!(is_fresh(now + chrono::Duration::seconds(30), now, ttl));
    }

    #[test]
    fn test_date_key_validation() {
        for ok in ["2024-03-10", "10/03/2024", "2024.3.1", "03-10"] {
            assert!(is_valid_date_key(ok), "{ok}");
        }
        for bad in ["current", "", "2024", "2024-03-10x", "../etc", "2024-03-10-11-12"] {
            assert!(!is_valid_date_key(bad), "{bad}");
        }
    }

    #[test]
    fn test_date_url_template() {
        let svc = service(Arc::new(MemoryCacheStore::new()));
        assert_eq!(
            svc.date_url("2024-03-10"),
            "https://fixtures.example/?date=2024-03-10"
        );

        let mut settings = ServiceSettings::new("https://fixtures.example");
        settings.date_url_template = "{origin}/results/{date}".into();
        let svc = FixtureService::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(Unreachable),
            Extractor::default(),
            settings,
        );
        assert_eq!(
            svc.date_url("2024-03-10"),
            "https://fixtures.example/results/2024-03-10"
        );
    }

    #[tokio::test]
    async fn test_invalid_date_is_rejected_before_io() {
        let svc = service(Arc::new(MemoryCacheStore::new()));
        let err = svc.fetch_by_date("current").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidDate(d) if d == "current"));
    }

    #[tokio::test]
    async fn test_mismatched_payload_kind_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        let snap = Snapshot {
            week: "2024-03-10".into(),
            records: vec![],
            fetched_at: Utc::now(),
        };
        store.seed(
            "current",
            CachePayload::Historical(snap).to_value().unwrap(),
            Utc::now(),
        );
        let err = service(store).fetch_current().await.unwrap_err();
        assert!(matches!(err, FetchError::Render(RenderError::Navigation { .. })));
    }

    #[tokio::test]
    async fn test_discovery_failure_is_reported() {
        let svc = service(Arc::new(MemoryCacheStore::new()));
        match svc.list_available_weeks().await {
            WeekDiscovery::Failed { reason } => assert!(reason.contains("ERR_NAME_NOT_RESOLVED")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
