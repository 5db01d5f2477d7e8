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

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Store `put` results by store family and outcome.
    pub store_put_total: IntCounterVec,
    /// Removed records by store family.
    pub store_removed_total: IntCounterVec,
    /// Refreshed records by store family.
    pub store_refreshed_total: IntCounterVec,
    /// TTL-pruned records by store family.
    pub store_pruned_total: IntCounterVec,
    /// Records evicted to make room for a stronger one.
    pub store_evicted_total: IntCounterVec,
    /// Open category stores.
    pub stores_open: IntGauge,
    /// Failed persistence batches.
    pub persistence_errors_total: IntCounter,

    /// Pings sent.
    pub keepalive_pings_sent_total: IntCounter,
    /// Matching pongs received.
    pub keepalive_pongs_received_total: IntCounter,
    /// Pongs whose nonce matched no outstanding ping.
    pub keepalive_pong_mismatch_total: IntCounter,
    /// Pings that timed out.
    pub keepalive_timeouts_total: IntCounter,
    /// Outstanding pings.
    pub keepalive_outstanding: IntGauge,
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, MetricsError> {
    IntCounterVec::new(Opts::new(name, help), labels).map_err(|_| MetricsError::Prom)
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let store_put_total = counter_vec(
            "meshdata_store_put_total",
            "Store put results",
            &["store", "result"],
        )?;
        let store_removed_total =
            counter_vec("meshdata_store_removed_total", "Removed records", &["store"])?;
        let store_refreshed_total =
            counter_vec("meshdata_store_refreshed_total", "Refreshed records", &["store"])?;
        let store_pruned_total =
            counter_vec("meshdata_store_pruned_total", "Expired records pruned", &["store"])?;
        let store_evicted_total = counter_vec(
            "meshdata_store_evicted_total",
            "Records evicted for capacity",
            &["store"],
        )?;
        let stores_open = IntGauge::new("meshdata_stores_open", "Open category stores")
            .map_err(|_| MetricsError::Prom)?;
        let persistence_errors_total = IntCounter::new(
            "meshdata_persistence_errors_total",
            "Failed persistence batches",
        )
        .map_err(|_| MetricsError::Prom)?;

        let keepalive_pings_sent_total =
            IntCounter::new("meshdata_keepalive_pings_sent_total", "Pings sent")
                .map_err(|_| MetricsError::Prom)?;
        let keepalive_pongs_received_total =
            IntCounter::new("meshdata_keepalive_pongs_received_total", "Matching pongs received")
                .map_err(|_| MetricsError::Prom)?;
        let keepalive_pong_mismatch_total = IntCounter::new(
            "meshdata_keepalive_pong_mismatch_total",
            "Pongs without a matching ping",
        )
        .map_err(|_| MetricsError::Prom)?;
        let keepalive_timeouts_total =
            IntCounter::new("meshdata_keepalive_timeouts_total", "Ping timeouts")
                .map_err(|_| MetricsError::Prom)?;
        let keepalive_outstanding =
            IntGauge::new("meshdata_keepalive_outstanding", "Outstanding pings")
                .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(store_put_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(store_removed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(store_refreshed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(store_pruned_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(store_evicted_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(stores_open.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(persistence_errors_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(keepalive_pings_sent_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(keepalive_pongs_received_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(keepalive_pong_mismatch_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(keepalive_timeouts_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(keepalive_outstanding.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            store_put_total,
            store_removed_total,
            store_refreshed_total,
            store_pruned_total,
            store_evicted_total,
            stores_open,
            persistence_errors_total,
            keepalive_pings_sent_total,
            keepalive_pongs_received_total,
            keepalive_pong_mismatch_total,
            keepalive_timeouts_total,
            keepalive_outstanding,
        })
    }
}
