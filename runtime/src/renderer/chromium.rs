// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.
//!
//! Every render launches its own browser with a throwaway profile directory
//! and tears it down before returning, on success and on failure alike.

use super::{RenderSettings, Renderer};
use crate::error::RenderError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, Headers,
    RequestId, ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Flags needed to run inside containers and other restricted hosts.
const LAUNCH_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
];

const IDLE_POLL: Duration = Duration::from_millis(50);
const SELECTOR_POLL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. FIXTURE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FIXTURE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.fixture-cache/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".fixture-cache/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".fixture-cache/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".fixture-cache/chromium/chrome-linux64/chrome"),
                home.join(".fixture-cache/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Sub-resources that are never fetched.
pub fn is_blocked(resource: &ResourceType) -> bool {
    matches!(
        resource,
        ResourceType::Image | ResourceType::Stylesheet | ResourceType::Font | ResourceType::Media
    )
}

/// Chromium-based renderer. Holds no browser between calls.
pub struct ChromiumRenderer {
    settings: RenderSettings,
}

impl ChromiumRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self, exe: PathBuf, profile_dir: &Path) -> Result<BrowserConfig, RenderError> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(exe)
            .user_data_dir(profile_dir)
            .request_timeout(self.settings.navigation_timeout);
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        builder
            .build()
            .map_err(|e| RenderError::Launch(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String, RenderError> {
        let exe = self
            .settings
            .chromium_path
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                RenderError::Launch("Chromium not found; set FIXTURE_CHROMIUM_PATH".into())
            })?;

        let profile = ProfileDir::new();
        let config = self.browser_config(exe, profile.path())?;

        let started = std::time::Instant::now();
        let result = match BrowserSession::launch(config).await {
            Ok(session) => {
                let result = session.render(url, wait_selector, &self.settings).await;
                session.shutdown().await;
                result
            }
            Err(e) => Err(e),
        };

        drop(profile);

        debug!(
            url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "render finished"
        );
        result
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Throwaway browser profile directory, removed when dropped.
struct ProfileDir(PathBuf);

impl ProfileDir {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("fixture-cache-{}", uuid::Uuid::new_v4())))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.0) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("could not remove browser profile {}: {e}", self.0.display()),
        }
    }
}

/// One launched browser process and its CDP event pump.
struct BrowserSession {
    browser: Browser,
    handler: AbortOnDrop,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig) -> Result<Self, RenderError> {
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            handler: AbortOnDrop(handler),
        })
    }

    async fn render(
        &self,
        url: &str,
        wait_selector: Option<&str>,
        settings: &RenderSettings,
    ) -> Result<String, RenderError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Automation(format!("failed to create page: {e}")))?;

        let result = load(&page, url, wait_selector, settings).await;

        if let Err(e) = page.close().await {
            debug!("page close failed: {e}");
        }
        result
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("browser close failed, killing: {e}");
            let _ = self.browser.kill().await;
        }
        let exited = tokio::time::timeout(SHUTDOWN_GRACE, self.browser.wait()).await;
        if exited.is_err() {
            warn!("browser did not exit within {}s, killing", SHUTDOWN_GRACE.as_secs());
            let _ = self.browser.kill().await;
        }
        drop(self.handler);
    }
}

async fn load(
    page: &Page,
    url: &str,
    wait_selector: Option<&str>,
    settings: &RenderSettings,
) -> Result<String, RenderError> {
    let ua = SetUserAgentOverrideParams::builder()
        .user_agent(settings.pick_user_agent())
        .accept_language(settings.accept_language.clone())
        .build()
        .map_err(RenderError::Automation)?;
    page.execute(ua).await.map_err(automation)?;

    let headers = serde_json::json!({ "Accept-Language": settings.accept_language });
    page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
        .await
        .map_err(automation)?;

    let _filter = install_resource_filter(page).await?;
    let idle = NetworkIdle::watch(page).await?;

    let navigation = tokio::time::timeout(settings.navigation_timeout, async {
        page.goto(url).await.map_err(|e| RenderError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        idle.settled(settings.network_idle).await;
        Ok::<_, RenderError>(())
    })
    .await;

    match navigation {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(RenderError::Timeout {
                url: url.to_string(),
                after_ms: settings.navigation_timeout.as_millis() as u64,
            })
        }
    }

    if let Some(selector) = wait_selector {
        if !wait_for_selector(page, selector, settings.selector_timeout).await {
            warn!(
                url,
                selector,
                "selector did not appear within {}ms, using current HTML",
                settings.selector_timeout.as_millis()
            );
        }
    }

    let html: String = page
        .evaluate("document.documentElement.outerHTML")
        .await
        .map_err(|e| RenderError::Automation(format!("failed to get HTML: {e}")))?
        .into_value()
        .map_err(|e| RenderError::Automation(format!("failed to convert HTML result: {e:?}")))?;

    Ok(html)
}

fn automation(e: chromiumoxide::error::CdpError) -> RenderError {
    RenderError::Automation(e.to_string())
}

/// Intercept every request and fail the blocked resource types.
async fn install_resource_filter(page: &Page) -> Result<AbortOnDrop, RenderError> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(automation)?;

    let pattern = RequestPattern::builder()
        .url_pattern("*")
        .request_stage(RequestStage::Request)
        .build();
    page.execute(EnableParams::builder().pattern(pattern).build())
        .await
        .map_err(automation)?;

    let page = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let outcome = if is_blocked(&event.resource_type) {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!("request filter could not resolve paused request: {e}");
            }
        }
    });
    Ok(AbortOnDrop(task))
}

#[derive(Debug)]
struct Activity {
    inflight: HashSet<RequestId>,
    last_change: Instant,
}

enum NetEvent {
    Started(RequestId),
    Done(RequestId),
}

/// Tracks requests in flight to detect network idle.
struct NetworkIdle {
    activity: Arc<Mutex<Activity>>,
    _task: AbortOnDrop,
}

impl NetworkIdle {
    async fn watch(page: &Page) -> Result<Self, RenderError> {
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(automation)?
            .map(|e| NetEvent::Started(e.request_id.clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(automation)?
            .map(|e| NetEvent::Done(e.request_id.clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(automation)?
            .map(|e| NetEvent::Done(e.request_id.clone()));

        let activity = Arc::new(Mutex::new(Activity {
            inflight: HashSet::new(),
            last_change: Instant::now(),
        }));

        let tracked = Arc::clone(&activity);
        let task = tokio::spawn(async move {
            let mut events = std::pin::pin!(futures::stream::select(
                started,
                futures::stream::select(finished, failed)
            ));
            while let Some(event) = events.next().await {
                let Ok(mut a) = tracked.lock() else { break };
                match event {
                    NetEvent::Started(id) => {
                        a.inflight.insert(id);
                    }
                    NetEvent::Done(id) => {
                        a.inflight.remove(&id);
                    }
                }
                a.last_change = Instant::now();
            }
        });

        Ok(Self {
            activity,
            _task: AbortOnDrop(task),
        })
    }

    /// Resolve once nothing has been in flight for `window`.
    async fn settled(&self, window: Duration) {
        loop {
            let quiet = match self.activity.lock() {
                Ok(a) => a.inflight.is_empty() && a.last_change.elapsed() >= window,
                Err(_) => true,
            };
            if quiet {
                return;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }
}

async fn wait_for_selector(page: &Page, selector: &str, window: Duration) -> bool {
    let poll = async {
        loop {
            if page.find_element(selector).await.is_ok() {
                return;
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    };
    tokio::time::timeout(window, poll).await.is_ok()
}
