// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based page rendering.
//!
//! A `Renderer` turns a URL into the HTML the page shows after client-side
//! scripts have run. The production backend is Chromium via chromiumoxide;
//! [`crate::resilience::ResilientRenderer`] layers retry and a circuit
//! breaker over any backend.

pub mod chromium;

pub use chromium::{find_chromium, ChromiumRenderer};

use crate::error::RenderError;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::time::Duration;

/// Hard limit on navigation, from request to network idle.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for an optional "rendering finished" selector.
pub const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Quiet period with no requests in flight that counts as network idle.
pub const DEFAULT_NETWORK_IDLE: Duration = Duration::from_millis(500);

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

/// User agents rotated across renders.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
];

/// A browser engine that renders a page to HTML.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `url` and return the page HTML once the network has gone idle.
    ///
    /// When `wait_selector` is given, also wait briefly for it to appear. Not
    /// finding it is logged and the HTML present at that point is returned.
    async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String, RenderError>;
}

/// Per-render browser policy.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub network_idle: Duration,
    pub accept_language: String,
    pub user_agents: Vec<String>,
    /// Explicit browser executable. Autodetected when `None`.
    pub chromium_path: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            selector_timeout: DEFAULT_SELECTOR_TIMEOUT,
            network_idle: DEFAULT_NETWORK_IDLE,
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            user_agents: USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            chromium_path: None,
        }
    }
}

impl RenderSettings {
    /// Pick a user agent at random from the pool.
    pub fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(USER_AGENTS[0])
    }
}
