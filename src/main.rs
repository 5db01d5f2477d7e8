// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! meshdata node daemon.
//! Opens the data stores, runs the prune sweep and the metrics endpoint until ctrl-c.

use anyhow::Context;
use meshdata::{
    core::config::NodeConfig,
    monitoring::{http::MetricsServer, metrics::Metrics},
    networking::authorization::AuthorizationService,
    storage::{prune::PruneService, registry::Storage},
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("MESHDATA_LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_level(true);
    let _ = if json { builder.json().try_init() } else { builder.compact().try_init() };
}

fn load_config() -> anyhow::Result<NodeConfig> {
    let mut cfg = match std::env::var("MESHDATA_CONFIG") {
        Ok(path) => NodeConfig::load(Path::new(&path)).with_context(|| format!("loading config {path}"))?,
        Err(_) => NodeConfig::default(),
    };
    if let Ok(dir) = std::env::var("MESHDATA_DATA_DIR") {
        cfg.node.data_dir = dir;
    }
    cfg.validate().context("validating config")?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cfg = load_config()?;

    info!(
        node = %cfg.node.name,
        data_dir = %cfg.node.data_dir,
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "meshdata node starting"
    );

    let metrics = Arc::new(Metrics::new().context("metrics init")?);
    let storage = Arc::new(
        Storage::open(&cfg.node.data_dir, cfg.storage.clone(), metrics.clone())
            .context("opening storage")?,
    );
    let authorization = AuthorizationService::new(cfg.authorization.preferred.clone());
    info!(preferred = ?authorization.preferred(), "authorization token preference");

    let prune = PruneService::spawn(storage.clone(), cfg.storage.prune_interval());

    let addr: SocketAddr = cfg.http.listen_addr.parse().context("parsing http.listen_addr")?;
    let server = MetricsServer::spawn(addr, metrics.clone()).await.context("binding metrics endpoint")?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");

    prune.shutdown().await;
    server.shutdown().await;
    let storage_for_shutdown = storage.clone();
    tokio::task::spawn_blocking(move || storage_for_shutdown.shutdown_all())
        .await
        .context("store shutdown task")?;
    info!("meshdata node stopped");
    Ok(())
}
