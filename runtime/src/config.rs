// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration and component wiring.
//!
//! Every knob has a default except the origin URL. Values that are present
//! but unparsable fail startup instead of silently falling back.

use crate::extract::{
    Extractor, DEFAULT_TABLE_SELECTOR, DEFAULT_WEEK_SELECTOR, DEFAULT_WEEK_SEPARATOR,
};
use crate::renderer::{ChromiumRenderer, RenderSettings, Renderer};
use crate::resilience::{BreakerConfig, ResilientRenderer, RetryPolicy};
use crate::service::{FixtureService, ServiceSettings, DEFAULT_DATE_URL_TEMPLATE};
use crate::store::{CacheStore, MemoryCacheStore, PgCacheStore, PgSettings, SqliteCacheStore, TlsMode};
use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_POOL_SIZE: usize = 8;
const DEFAULT_CURRENT_TTL_SECS: u64 = 600;
const DEFAULT_NAV_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RENDER_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RENDER_BACKOFF_MS: u64 = 500;
const MAX_RENDER_BACKOFF: Duration = Duration::from_secs(8);
const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 60;

/// Which cache backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Sqlite,
    Memory,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!(
                "unknown store `{other}` (expected postgres, sqlite or memory)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub origin_url: String,
    pub date_url_template: String,

    pub store: StoreKind,
    pub database_url: Option<String>,
    pub db_tls: TlsMode,
    pub db_pool_size: usize,
    pub sqlite_path: PathBuf,

    pub http_host: String,
    pub http_port: u16,

    pub current_ttl: Duration,
    pub serve_stale_on_error: bool,

    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub chromium_path: Option<PathBuf>,

    pub table_selector: String,
    pub week_selector: String,
    pub week_separator: char,

    pub render_max_attempts: u32,
    pub render_backoff: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let origin_url = env
            .string("FIXTURE_ORIGIN_URL")
            .context("FIXTURE_ORIGIN_URL must be set to the origin site's root page")?;
        url::Url::parse(&origin_url)
            .with_context(|| format!("FIXTURE_ORIGIN_URL is not a valid URL: {origin_url}"))?;

        let date_url_template = env
            .string("FIXTURE_DATE_URL_TEMPLATE")
            .unwrap_or_else(|| DEFAULT_DATE_URL_TEMPLATE.to_string());
        if !date_url_template.contains("{date}") {
            bail!("FIXTURE_DATE_URL_TEMPLATE must contain `{{date}}`: {date_url_template}");
        }

        let database_url = env.string("DATABASE_URL");
        let store = match env.parsed::<StoreKind>("FIXTURE_STORE")? {
            Some(kind) => kind,
            None if database_url.is_some() => StoreKind::Postgres,
            None => StoreKind::Sqlite,
        };
        if store == StoreKind::Postgres && database_url.is_none() {
            bail!("FIXTURE_STORE=postgres requires DATABASE_URL");
        }

        let week_separator = match env.string("FIXTURE_WEEK_SEPARATOR") {
            None => DEFAULT_WEEK_SEPARATOR,
            Some(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => bail!("FIXTURE_WEEK_SEPARATOR must be a single character, got `{raw}`"),
                }
            }
        };

        Ok(Self {
            origin_url,
            date_url_template,
            store,
            database_url,
            db_tls: env.parsed::<TlsMode>("FIXTURE_DB_TLS")?.unwrap_or(TlsMode::Relaxed),
            db_pool_size: env.number("FIXTURE_DB_POOL_SIZE", DEFAULT_POOL_SIZE)?,
            sqlite_path: env
                .string("FIXTURE_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_sqlite_path),
            http_host: env
                .string("FIXTURE_HTTP_HOST")
                .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            http_port: env.number("PORT", DEFAULT_HTTP_PORT)?,
            current_ttl: Duration::from_secs(
                env.number("FIXTURE_CURRENT_TTL_SECS", DEFAULT_CURRENT_TTL_SECS)?,
            ),
            serve_stale_on_error: env.flag("FIXTURE_SERVE_STALE_ON_ERROR")?,
            navigation_timeout: Duration::from_millis(
                env.number("FIXTURE_NAV_TIMEOUT_MS", DEFAULT_NAV_TIMEOUT_MS)?,
            ),
            selector_timeout: Duration::from_millis(
                env.number("FIXTURE_SELECTOR_TIMEOUT_MS", DEFAULT_SELECTOR_TIMEOUT_MS)?,
            ),
            chromium_path: env.string("FIXTURE_CHROMIUM_PATH").map(PathBuf::from),
            table_selector: env
                .string("FIXTURE_TABLE_SELECTOR")
                .unwrap_or_else(|| DEFAULT_TABLE_SELECTOR.to_string()),
            week_selector: env
                .string("FIXTURE_WEEK_SELECTOR")
                .unwrap_or_else(|| DEFAULT_WEEK_SELECTOR.to_string()),
            week_separator,
            render_max_attempts: env
                .number("FIXTURE_RENDER_MAX_ATTEMPTS", DEFAULT_RENDER_MAX_ATTEMPTS)?
                .max(1),
            render_backoff: Duration::from_millis(
                env.number("FIXTURE_RENDER_BACKOFF_MS", DEFAULT_RENDER_BACKOFF_MS)?,
            ),
            breaker_threshold: env
                .number("FIXTURE_BREAKER_THRESHOLD", DEFAULT_BREAKER_THRESHOLD)?
                .max(1),
            breaker_cooldown: Duration::from_secs(
                env.number("FIXTURE_BREAKER_COOLDOWN_SECS", DEFAULT_BREAKER_COOLDOWN_SECS)?,
            ),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http_host, self.http_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid bind address {}:{} (FIXTURE_HTTP_HOST / PORT)",
                    self.http_host, self.http_port
                )
            })
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            navigation_timeout: self.navigation_timeout,
            selector_timeout: self.selector_timeout,
            chromium_path: self.chromium_path.clone(),
            ..RenderSettings::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.render_max_attempts,
            initial_backoff: self.render_backoff,
            max_backoff: MAX_RENDER_BACKOFF,
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_threshold,
            cooldown: self.breaker_cooldown,
        }
    }

    pub fn extractor(&self) -> Result<Extractor> {
        Extractor::new(&self.table_selector, &self.week_selector, self.week_separator)
            .context("FIXTURE_TABLE_SELECTOR / FIXTURE_WEEK_SELECTOR")
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            origin_url: self.origin_url.clone(),
            date_url_template: self.date_url_template.clone(),
            current_ttl: self.current_ttl,
            serve_stale_on_error: self.serve_stale_on_error,
        }
    }

    /// Chromium behind retry and circuit breaking.
    pub fn renderer(&self) -> Arc<dyn Renderer> {
        Arc::new(ResilientRenderer::new(
            ChromiumRenderer::new(self.render_settings()),
            self.retry_policy(),
            self.breaker_config(),
        ))
    }

    /// Open the configured cache backend. Postgres schema is created if absent.
    pub async fn build_store(&self) -> Result<Arc<dyn CacheStore>> {
        let store: Arc<dyn CacheStore> = match self.store {
            StoreKind::Postgres => {
                let url = self
                    .database_url
                    .clone()
                    .context("DATABASE_URL is required for the postgres store")?;
                let store = PgCacheStore::connect(&PgSettings {
                    url,
                    tls: self.db_tls,
                    pool_size: self.db_pool_size,
                })
                .context("Failed to create Postgres pool")?;
                store
                    .migrate()
                    .await
                    .context("Failed to prepare cache_entries table")?;
                Arc::new(store)
            }
            StoreKind::Sqlite => Arc::new(
                SqliteCacheStore::open(&self.sqlite_path).with_context(|| {
                    format!("Failed to open SQLite cache at {}", self.sqlite_path.display())
                })?,
            ),
            StoreKind::Memory => Arc::new(MemoryCacheStore::new()),
        };
        info!(backend = store.backend(), "cache store ready");
        Ok(store)
    }

    /// Wire store, renderer and extractor into a service.
    pub async fn service(&self) -> Result<FixtureService> {
        let store = self.build_store().await?;
        Ok(FixtureService::new(
            store,
            self.renderer(),
            self.extractor()?,
            self.service_settings(),
        ))
    }
}

fn default_sqlite_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fixture-cache")
        .join("cache.db")
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("{name}={raw}: {e}")),
        }
    }

    fn number<T>(&self, name: &str, default_value: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parsed(name)?.unwrap_or(default_value))
    }

    fn flag(&self, name: &str) -> Result<bool> {
        match self.string(name).map(|v| v.to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => bail!("{name}={v}: expected true or false"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    const ORIGIN: (&str, &str) = ("FIXTURE_ORIGIN_URL", "https://fixtures.example/");

    #[test]
    fn test_defaults() {
        let cfg = load(&[ORIGIN]).unwrap();
        assert_eq!(cfg.store, StoreKind::Sqlite);
        assert_eq!(cfg.db_tls, TlsMode::Relaxed);
        assert_eq!(cfg.http_port, 3000);
        assert_eq!(cfg.current_ttl, Duration::from_secs(600));
        assert_eq!(cfg.navigation_timeout, Duration::from_secs(30));
        assert_eq!(cfg.selector_timeout, Duration::from_secs(5));
        assert_eq!(cfg.week_separator, '-');
        assert!(!cfg.serve_stale_on_error);
        assert_eq!(cfg.bind_addr().unwrap().port(), 3000);
        assert!(cfg.sqlite_path.ends_with(".fixture-cache/cache.db"));
    }

    #[test]
    fn test_origin_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("FIXTURE_ORIGIN_URL", "not a url")]).is_err());
    }

    #[test]
    fn test_database_url_selects_postgres() {
        let cfg = load(&[ORIGIN, ("DATABASE_URL", "postgres://u:p@db/fixtures")]).unwrap();
        assert_eq!(cfg.store, StoreKind::Postgres);

        let cfg = load(&[
            ORIGIN,
            ("DATABASE_URL", "postgres://u:p@db/fixtures"),
            ("FIXTURE_STORE", "memory"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreKind::Memory);

        assert!(load(&[ORIGIN, ("FIXTURE_STORE", "postgres")]).is_err());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(load(&[ORIGIN, ("PORT", "eighty")]).is_err());
        assert!(load(&[ORIGIN, ("FIXTURE_DB_TLS", "strict")]).is_err());
        assert!(load(&[ORIGIN, ("FIXTURE_STORE", "redis")]).is_err());
        assert!(load(&[ORIGIN, ("FIXTURE_WEEK_SEPARATOR", "--")]).is_err());
        assert!(load(&[ORIGIN, ("FIXTURE_SERVE_STALE_ON_ERROR", "maybe")]).is_err());
        assert!(load(&[ORIGIN, ("FIXTURE_DATE_URL_TEMPLATE", "{origin}/results")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cfg = load(&[
            ORIGIN,
            ("PORT", "8080"),
            ("FIXTURE_CURRENT_TTL_SECS", "60"),
            ("FIXTURE_SERVE_STALE_ON_ERROR", "true"),
            ("FIXTURE_RENDER_MAX_ATTEMPTS", "0"),
            ("FIXTURE_WEEK_SEPARATOR", "/"),
        ])
        .unwrap();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.current_ttl, Duration::from_secs(60));
        assert!(cfg.serve_stale_on_error);
        assert_eq!(cfg.render_max_attempts, 1);
        assert_eq!(cfg.week_separator, '/');
    }

    #[test]
    fn test_bad_selector_fails_extractor() {
        let cfg = load(&[ORIGIN, ("FIXTURE_TABLE_SELECTOR", "tbody[")]).unwrap();
        assert!(cfg.extractor().is_err());
    }

    #[tokio::test]
    async fn test_memory_service_wiring() {
        let cfg = load(&[ORIGIN, ("FIXTURE_STORE", "memory")]).unwrap();
        let svc = cfg.service().await.unwrap();
        assert_eq!(svc.store_backend(), "memory");
        assert_eq!(svc.settings().origin_url, "https://fixtures.example/");
    }
}
