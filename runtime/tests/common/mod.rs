//! Test doubles shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fixture_cache::error::{RenderError, StoreError};
use fixture_cache::extract::Extractor;
use fixture_cache::model::{CacheEntry, CachePayload, ScheduleRecord, Snapshot};
use fixture_cache::renderer::Renderer;
use fixture_cache::service::{FixtureService, ServiceSettings};
use fixture_cache::store::CacheStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ORIGIN: &str = "https://fixtures.example/";

// ── Origin pages ──

pub fn row(number: &str, home: &str, away: &str, result: &str, status: &str) -> String {
    format!(
        "<tr><td>{number}</td><td>{home}</td><td>v</td><td>{away}</td><td>{result}</td><td>{status}</td></tr>"
    )
}

/// A rendered origin page with a week picker and a fixtures table.
pub fn fixtures_page(rows: &[String]) -> String {
    format!(
        "<html><body>\
         <select name=\"week\">\
           <option value=\"\">Pick a week</option>\
           <option value=\"2024-03-03\">Week 1</option>\
           <option value=\"2024-03-10\" selected>Week 2</option>\
         </select>\
         <table><tbody>{}</tbody></table>\
         </body></html>",
        rows.concat()
    )
}

pub fn default_page() -> String {
    fixtures_page(&[
        row("12", "Red FC", "Blue FC", "2-1", "FT"),
        row("13", "Green FC", "Gold FC", "", "18:00"),
    ])
}

pub fn record(number: &str, home: &str, away: &str) -> ScheduleRecord {
    ScheduleRecord {
        number: number.into(),
        home: home.into(),
        away: away.into(),
        result: String::new(),
        status: String::new(),
    }
}

pub fn current_payload(records: Vec<ScheduleRecord>) -> serde_json::Value {
    CachePayload::Current(Snapshot {
        week: "Week 1".into(),
        records,
        fetched_at: Utc::now(),
    })
    .to_value()
    .unwrap()
}

pub fn historical_payload(date: &str, records: Vec<ScheduleRecord>) -> serde_json::Value {
    CachePayload::Historical(Snapshot {
        week: date.into(),
        records,
        fetched_at: Utc::now(),
    })
    .to_value()
    .unwrap()
}

pub fn ago(d: Duration) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::from_std(d).unwrap()
}

// ── Renderer ──

/// Fake origin: serves fixed HTML after an optional delay and counts renders.
pub struct FakeOrigin {
    html: Mutex<String>,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FakeOrigin {
    pub fn new(html: impl Into<String>) -> Arc<Self> {
        Self::with_delay(html, Duration::ZERO)
    }

    pub fn with_delay(html: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            html: Mutex::new(html.into()),
            delay,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        let origin = Self::new("");
        origin.set_failing(true);
        origin
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_html(&self, html: impl Into<String>) {
        *self.html.lock().unwrap() = html.into();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FakeOrigin {
    async fn render(&self, url: &str, _wait_selector: Option<&str>) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RenderError::Timeout {
                url: url.to_string(),
                after_ms: 30_000,
            });
        }
        Ok(self.html.lock().unwrap().clone())
    }
}

/// Hands a shared `FakeOrigin` to decorators that own their inner renderer.
pub struct Lent(pub Arc<FakeOrigin>);

#[async_trait]
impl Renderer for Lent {
    async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String, RenderError> {
        self.0.render(url, wait_selector).await
    }
}

// ── Store ──

/// A store whose database is unreachable.
pub struct BrokenStore {
    pub puts: AtomicUsize,
}

impl BrokenStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            puts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Err(StoreError::Connection("connection refused".into()))
    }

    async fn put(&self, _key: &str, _payload: &serde_json::Value) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection refused".into()))
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

// ── Service ──

pub fn service(store: Arc<dyn CacheStore>, origin: Arc<FakeOrigin>) -> FixtureService {
    service_with(store, origin, ServiceSettings::new(ORIGIN))
}

pub fn service_with(
    store: Arc<dyn CacheStore>,
    origin: Arc<FakeOrigin>,
    settings: ServiceSettings,
) -> FixtureService {
    FixtureService::new(store, origin, Extractor::default(), settings)
}
