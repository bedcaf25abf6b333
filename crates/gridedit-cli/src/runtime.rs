// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::config::Config;
use anyhow::{Context, Result};
use gridedit_api::Client;
use gridedit_app::TableBackend;
use log::info;
use std::sync::Arc;

/// The REST client for `[api]`, or the seeded in-memory backend for `--demo`.
pub fn build_backend(config: &Config, demo: bool) -> Result<Arc<dyn TableBackend>> {
    if demo {
        info!("using the in-memory demo backend");
        let backend: Arc<dyn TableBackend> =
            Arc::new(gridedit_testkit::demo_backend().context("seed demo data")?);
        return Ok(backend);
    }

    let base_url = config.base_url();
    let client = Client::new(&base_url, config.api_timeout()?)
        .context("invalid [api] config; fix base_url/timeout values")?;
    info!(
        "using table service at {} (timeout {:?})",
        client.base_url(),
        client.timeout()
    );
    let backend: Arc<dyn TableBackend> = Arc::new(client);
    Ok(backend)
}

/// Startup check for `--check`: the table list must load.
pub fn check(backend: &dyn TableBackend) -> Result<Vec<String>> {
    backend.list_tables().context("fetch table list")
}
