// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::config::{Config, StoreKind};
use crate::renderer::find_chromium;
use anyhow::Result;

/// Check configuration, Chromium availability, and the cache store.
pub async fn run() -> Result<()> {
    println!("fixture-cache doctor");
    println!("====================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let mut ready = true;

    let config = match Config::from_env() {
        Ok(config) => {
            println!("[OK] Configuration loaded");
            println!("     origin: {}", config.origin_url);
            println!("     date page: {}", config.date_url_template);
            println!(
                "     current TTL: {}s, navigation timeout: {}ms",
                config.current_ttl.as_secs(),
                config.navigation_timeout.as_millis()
            );
            Some(config)
        }
        Err(e) => {
            println!("[!!] Configuration invalid: {e:#}");
            ready = false;
            None
        }
    };

    let chromium = config
        .as_ref()
        .and_then(|c| c.chromium_path.clone())
        .filter(|p| p.exists())
        .or_else(find_chromium);
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => {
            println!("[!!] Chromium NOT found. Install Chrome or set FIXTURE_CHROMIUM_PATH.");
            ready = false;
        }
    }

    if let Some(config) = &config {
        let target = match config.store {
            StoreKind::Postgres => format!("postgres ({:?} TLS)", config.db_tls),
            StoreKind::Sqlite => format!("sqlite at {}", config.sqlite_path.display()),
            StoreKind::Memory => "memory (not persisted)".to_string(),
        };
        match config.build_store().await {
            Ok(_) => println!("[OK] Cache store reachable: {target}"),
            Err(e) => {
                println!("[!!] Cache store unavailable: {target}: {e:#}");
                ready = false;
            }
        }
        if let Err(e) = config.extractor() {
            println!("[!!] Selectors invalid: {e:#}");
            ready = false;
        }
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}
