// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! `fixture-cache weeks`: live week discovery.

use crate::config::Config;
use crate::model::WeekDiscovery;
use anyhow::{bail, Result};

pub async fn run(config: Config) -> Result<()> {
    let service = config.service().await?;
    match service.list_available_weeks().await {
        WeekDiscovery::Failed { reason } => bail!("week discovery failed: {reason}"),
        discovery => super::print_json(&discovery.options()),
    }
}
