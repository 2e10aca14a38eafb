// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! `fixture-cache fetch`: one-shot fetch through the cache.

use crate::config::Config;
use anyhow::Result;

pub async fn run(config: Config, date: Option<&str>) -> Result<()> {
    let service = config.service().await?;
    let result = match date {
        Some(date) => service.fetch_by_date(date).await?,
        None => service.fetch_current().await?,
    };
    super::print_json(&result)
}
