// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging setup for the `cortex` binary

use anyhow::{Context, Result};

/// Install a global fmt subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {}", e))?,
        _ => builder
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {}", e))?,
    }

    Ok(())
}
