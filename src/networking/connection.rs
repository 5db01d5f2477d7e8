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

//! Transport contracts consumed by the keep-alive service.
//!
//! The node and its connections live outside this crate; these traits describe only what the
//! liveness protocol needs from them.

use crate::networking::messages::KeepAliveMessage;
use futures::future::BoxFuture;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;

/// Transport errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("io: {0}")]
    Io(String),
}

/// Traffic bookkeeping of one connection.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    last_update_ms: AtomicU64,
}

impl ConnectionMetrics {
    /// Metrics whose last traffic happened at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self { last_update_ms: AtomicU64::new(now_ms) }
    }

    /// Record inbound traffic at `now_ms`.
    pub fn on_received(&self, now_ms: u64) {
        self.last_update_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    /// Unix millis of the last inbound traffic.
    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms.load(Ordering::Relaxed)
    }
}

/// One peer link.
pub trait Connection: Send + Sync {
    /// Stable connection id.
    fn id(&self) -> &str;
    /// Address of the remote peer.
    fn peer_address(&self) -> &str;
    /// Traffic bookkeeping.
    fn metrics(&self) -> &ConnectionMetrics;
}

/// The local node as seen by the keep-alive service.
pub trait Node: Send + Sync {
    /// Currently open connections.
    fn connections(&self) -> Vec<Arc<dyn Connection>>;
    /// Send a message. Completion is signalled through the returned future.
    fn send(
        &self,
        connection: &Arc<dyn Connection>,
        message: KeepAliveMessage,
    ) -> BoxFuture<'static, Result<(), TransportError>>;
}
