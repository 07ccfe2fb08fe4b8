// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::domain::controller_config::{LogFormat, LoggingSettings};

/// Build the log filter: RUST_LOG wins over the configured level
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Failed to create log filter")
}

/// Initialize tracing subscriber for logging. Fails if a global subscriber
/// is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = build_filter(settings)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = match settings.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
