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

//! Ping/Pong liveness protocol.
//!
//! At most one probe is outstanding per connection. Each probe owns a handler in the
//! service's handler map and a timeout task; whichever of pong, timeout, disconnect or
//! shutdown happens first removes the handler and resolves the caller's [`PendingPing`].
//! A timeout only cleans up bookkeeping. Dropping an unresponsive connection is left to the
//! peer-management layer.

use crate::core::{config::KeepAliveSettings, types::now_ms};
use crate::monitoring::metrics::Metrics;
use crate::networking::{
    connection::{Connection, Node, TransportError},
    messages::{KeepAliveMessage, Ping, Pong},
};
use futures::future::BoxFuture;
use ring::rand::{SecureRandom, SystemRandom};
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, Weak},
    task::{Context, Poll},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Keep-alive timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Scheduler period.
    pub interval: Duration,
    /// Connections without inbound traffic for longer than this get probed.
    pub max_idle_time: Duration,
    /// Time a probe may stay unanswered.
    pub timeout: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_idle_time: Duration::from_secs(180),
            timeout: Duration::from_secs(90),
        }
    }
}

impl From<&KeepAliveSettings> for KeepAliveConfig {
    fn from(s: &KeepAliveSettings) -> Self {
        Self {
            interval: Duration::from_secs(s.interval_secs),
            max_idle_time: Duration::from_secs(s.max_idle_secs),
            timeout: Duration::from_secs(s.timeout_secs),
        }
    }
}

/// Why a probe did not complete.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeepAliveError {
    #[error("ping timed out")]
    Timeout,
    #[error("ping cancelled")]
    Cancelled,
    #[error("ping send failed: {0}")]
    Send(TransportError),
}

type PingResult = Result<Duration, KeepAliveError>;
type SendFuture = BoxFuture<'static, Result<(), TransportError>>;

struct Handler {
    nonce: i32,
    sent_at: Instant,
    reply: oneshot::Sender<PingResult>,
    timeout_task: JoinHandle<()>,
}

impl Handler {
    fn finish(self, result: PingResult) {
        self.timeout_task.abort();
        // The waiter may have dropped its PendingPing.
        let _ = self.reply.send(result);
    }
}

/// Outcome of one probe. Resolves to the round-trip time on a matching pong.
#[derive(Debug)]
pub struct PendingPing {
    nonce: i32,
    rx: oneshot::Receiver<PingResult>,
}

impl PendingPing {
    /// Nonce carried by the ping.
    pub fn nonce(&self) -> i32 {
        self.nonce
    }
}

impl Future for PendingPing {
    type Output = PingResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => Poll::Ready(Err(KeepAliveError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct Inner {
    node: Arc<dyn Node>,
    cfg: KeepAliveConfig,
    metrics: Arc<Metrics>,
    rng: SystemRandom,
    handlers: Mutex<HashMap<String, Handler>>,
}

impl Inner {
    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        match self.handlers.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    fn next_nonce(&self) -> Option<i32> {
        let mut b = [0u8; 4];
        self.rng.fill(&mut b).ok()?;
        Some(i32::from_be_bytes(b))
    }

    /// Remove the handler of `connection_id` only if it still belongs to the probe `nonce`.
    fn take_if(&self, connection_id: &str, nonce: i32) -> Option<Handler> {
        let mut map = self.handlers();
        if map.get(connection_id).map(|h| h.nonce) != Some(nonce) {
            return None;
        }
        let h = map.remove(connection_id);
        self.metrics.keepalive_outstanding.set(map.len() as i64);
        h
    }

    fn take(&self, connection_id: &str) -> Option<Handler> {
        let mut map = self.handlers();
        let h = map.remove(connection_id);
        self.metrics.keepalive_outstanding.set(map.len() as i64);
        h
    }

    fn send_ping(self: &Arc<Self>, connection: &Arc<dyn Connection>) -> Option<PendingPing> {
        let id = connection.id().to_string();
        let (reply, rx) = oneshot::channel();
        let (send_tx, send_rx) = oneshot::channel::<SendFuture>();
        let nonce = {
            let mut map = self.handlers();
            if map.contains_key(&id) {
                debug!(connection = %id, "ping already outstanding; skipping");
                return None;
            }
            let Some(nonce) = self.next_nonce() else {
                warn!(connection = %id, "nonce generation failed; skipping ping");
                return None;
            };

            let sent_at = Instant::now();
            let deadline = sent_at + self.cfg.timeout;
            let weak: Weak<Inner> = Arc::downgrade(self);
            let task_id = id.clone();
            // The deadline covers the send as well as the wait for the pong.
            let timeout_task = tokio::spawn(async move {
                let Ok(send) = send_rx.await else { return };
                let failure = match tokio::time::timeout_at(deadline, send).await {
                    Ok(Ok(())) => {
                        tokio::time::sleep_until(deadline).await;
                        KeepAliveError::Timeout
                    }
                    Ok(Err(e)) => KeepAliveError::Send(e),
                    Err(_) => KeepAliveError::Timeout,
                };
                let Some(inner) = weak.upgrade() else { return };
                let Some(h) = inner.take_if(&task_id, nonce) else { return };
                match &failure {
                    KeepAliveError::Send(e) => warn!(connection = %task_id, ?e, "ping send failed"),
                    _ => {
                        inner.metrics.keepalive_timeouts_total.inc();
                        info!(connection = %task_id, nonce, "ping timed out");
                    }
                }
                h.finish(Err(failure));
            });

            map.insert(id.clone(), Handler { nonce, sent_at, reply, timeout_task });
            self.metrics.keepalive_outstanding.set(map.len() as i64);
            nonce
        };

        // Sent with the handler map unlocked; the pong may arrive before `send` returns.
        let send = self.node.send(connection, Ping { nonce }.into());
        // Fails only if the probe already completed.
        let _ = send_tx.send(send);
        self.metrics.keepalive_pings_sent_total.inc();
        debug!(connection = %id, nonce, "ping sent");
        Some(PendingPing { nonce, rx })
    }

    fn probe_idle(self: &Arc<Self>) {
        let now = now_ms();
        let max_idle = self.cfg.max_idle_time.as_millis() as u64;
        for conn in self.node.connections() {
            if now.saturating_sub(conn.metrics().last_update_ms()) > max_idle {
                // Completion is tracked through the handler; nobody waits on it here.
                let _ = self.send_ping(&conn);
            }
        }
    }
}

/// Liveness service for all connections of one node.
pub struct KeepAliveService {
    inner: Arc<Inner>,
    scheduler: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl KeepAliveService {
    /// Create a stopped service.
    pub fn new(node: Arc<dyn Node>, cfg: KeepAliveConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                node,
                cfg,
                metrics,
                rng: SystemRandom::new(),
                handlers: Mutex::new(HashMap::new()),
            }),
            scheduler: Mutex::new(None),
        }
    }

    /// Timing in use.
    pub fn config(&self) -> &KeepAliveConfig {
        &self.inner.cfg
    }

    /// Start the periodic idle-connection scan. Calling it twice has no effect.
    pub fn initialize(&self) {
        let mut slot = match self.scheduler.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if slot.is_some() {
            debug!("keep-alive scheduler already running");
            return;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.cfg.interval;
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.probe_idle();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("keep-alive scheduler stopped");
        });
        *slot = Some((stop_tx, join));
        info!(interval_secs = interval.as_secs(), "keep-alive scheduler started");
    }

    /// Probe `connection` unless a probe is already outstanding for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn send_ping(&self, connection: &Arc<dyn Connection>) -> Option<PendingPing> {
        self.inner.send_ping(connection)
    }

    /// Handle an inbound keep-alive message from `connection`.
    pub fn on_message(&self, connection: &Arc<dyn Connection>, message: KeepAliveMessage) {
        match message {
            KeepAliveMessage::Ping(Ping { nonce }) => {
                let send = self.inner.node.send(connection, Pong { request_nonce: nonce }.into());
                let id = connection.id().to_string();
                tokio::spawn(async move {
                    if let Err(e) = send.await {
                        debug!(connection = %id, ?e, "pong send failed");
                    }
                });
            }
            KeepAliveMessage::Pong(Pong { request_nonce }) => {
                match self.inner.take_if(connection.id(), request_nonce) {
                    Some(h) => {
                        let rtt = h.sent_at.elapsed();
                        self.inner.metrics.keepalive_pongs_received_total.inc();
                        debug!(connection = %connection.id(), rtt_ms = rtt.as_millis() as u64, "pong received");
                        h.finish(Ok(rtt));
                    }
                    None => {
                        self.inner.metrics.keepalive_pong_mismatch_total.inc();
                        warn!(connection = %connection.id(), request_nonce, "pong without matching ping");
                    }
                }
            }
        }
    }

    /// Dispose any outstanding probe of a closed connection. Its waiter is cancelled at once.
    pub fn on_disconnect(&self, connection_id: &str) {
        if let Some(h) = self.inner.take(connection_id) {
            debug!(connection = %connection_id, "cancelled ping of closed connection");
            h.finish(Err(KeepAliveError::Cancelled));
        }
    }

    /// Outstanding probes.
    pub fn outstanding(&self) -> usize {
        self.inner.handlers().len()
    }

    /// True if a probe is outstanding for `connection_id`.
    pub fn is_outstanding(&self, connection_id: &str) -> bool {
        self.inner.handlers().contains_key(connection_id)
    }

    /// Stop the scheduler and cancel every outstanding probe.
    pub fn shutdown(&self) {
        let scheduler = match self.scheduler.lock() {
            Ok(mut g) => g.take(),
            Err(p) => p.into_inner().take(),
        };
        if let Some((stop_tx, join)) = scheduler {
            let _ = stop_tx.send(true);
            join.abort();
        }
        let drained: Vec<Handler> = {
            let mut map = self.inner.handlers();
            let v = map.drain().map(|(_, h)| h).collect();
            self.inner.metrics.keepalive_outstanding.set(0);
            v
        };
        for h in drained {
            h.finish(Err(KeepAliveError::Cancelled));
        }
        info!("keep-alive service shut down");
    }
}

impl Drop for KeepAliveService {
    fn drop(&mut self) {
        let scheduler = match self.scheduler.get_mut() {
            Ok(g) => g.take(),
            Err(p) => p.into_inner().take(),
        };
        if let Some((_, join)) = scheduler {
            join.abort();
        }
    }
}
