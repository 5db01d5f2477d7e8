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

//! Periodic TTL sweep over every cached store.

use crate::core::types::now_ms;
use crate::storage::registry::Storage;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info};

/// Handle to the running sweep task.
pub struct PruneService {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PruneService {
    /// Spawn the sweep on the current tokio runtime. The first sweep runs after one `interval`.
    pub fn spawn(storage: Arc<Storage>, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let pruned = storage.prune_all(now_ms());
                        debug!(pruned, "prune sweep done");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("prune service stopped");
        });
        Self { stop_tx, join }
    }

    /// Stop the sweep and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}
