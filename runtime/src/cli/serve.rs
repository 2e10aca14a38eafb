// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! `fixture-cache serve`: run the HTTP API.

use crate::config::Config;
use crate::rest;
use anyhow::{Context, Result};
use tracing::info;

pub async fn run(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.http_port = port;
    }
    let addr = config.bind_addr()?;

    info!(
        "starting fixture-cache v{} (store: {}, origin: {})",
        env!("CARGO_PKG_VERSION"),
        config.store.as_str(),
        config.origin_url
    );
    if crate::renderer::find_chromium().is_none() && config.chromium_path.is_none() {
        tracing::warn!("Chromium not found; renders will fail until FIXTURE_CHROMIUM_PATH is set");
    }

    let service = config.service().await?;
    rest::start(addr, service)
        .await
        .with_context(|| format!("REST API on {addr} failed"))
}
