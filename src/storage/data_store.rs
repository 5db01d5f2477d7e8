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

//! Generic per-category store engine.
//!
//! One [`DataStore`] holds the records of one [`MetaData`] category. Stateless validation
//! (content hash, size, expiry, owner key, signature) runs before the map lock is taken; replay
//! and capacity decisions run under it. Accepted mutations are handed to [`Persistence`] while
//! the lock is still held; listeners are notified after it is released.
//!
//! ## Replay protection
//! Every owner has one [`OwnerSequence`] per category. Adds, removals and refreshes must carry a
//! sequence number strictly above it. The bookkeeping outlives the records it protects and is
//! only forgotten once `max(tombstone_max_age, ttl)` has passed without an update, so any old
//! signed write it guarded has expired by then. Categories without a TTL never forget it.

use crate::core::{
    config::StorageConfig,
    metadata::MetaData,
    security::signing::{add_signing_bytes, refresh_signing_bytes, remove_signing_bytes, verify},
    types::{now_ms, ContentHash, PubKeyHash, PublicKey},
};
use crate::monitoring::metrics::Metrics;
use crate::storage::{
    persistence::{KvOp, Persistence, PersistenceError},
    policy::{AppendOnlyPolicy, AuthenticatedPolicy, MailboxPolicy, StorePolicy},
    record::{
        DistributedDataRecord, OwnerSequence, PutOutcome, RefreshOutcome, RefreshProof,
        RejectReason, RemovalProof, RemoveOutcome, StoredEntry,
    },
};
use std::{
    collections::{HashMap, HashSet},
    fs,
    marker::PhantomData,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, RwLock},
    time::Duration,
};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Observer of store mutations. Callbacks run outside the store lock.
pub trait StoreListener: Send + Sync {
    /// A new record was stored.
    fn on_added(&self, _key: &ContentHash, _record: &DistributedDataRecord) {}
    /// A record was removed by its owner.
    fn on_removed(&self, _key: &ContentHash, _record: &DistributedDataRecord) {}
    /// A record was replaced by a newer version or had its lifetime extended.
    fn on_refreshed(&self, _key: &ContentHash, _record: &DistributedDataRecord) {}
}

#[derive(Default)]
struct Inner {
    records: HashMap<ContentHash, StoredEntry>,
    sequences: HashMap<PubKeyHash, OwnerSequence>,
}

impl Inner {
    fn last_sequence(&self, owner: &PubKeyHash) -> Option<i64> {
        self.sequences.get(owner).map(|s| s.sequence_number)
    }

    fn is_stale(&self, owner: &PubKeyHash, sequence_number: i64) -> bool {
        matches!(self.last_sequence(owner), Some(last) if sequence_number <= last)
    }

    fn advance(&mut self, owner: PubKeyHash, sequence_number: i64, now: u64) -> Result<KvOp, PersistenceError> {
        let seq = OwnerSequence { sequence_number, updated_ms: now };
        self.sequences.insert(owner, seq);
        KvOp::put_sequence(&owner, &seq)
    }
}

enum Notify {
    Added(ContentHash, DistributedDataRecord),
    Removed(ContentHash, DistributedDataRecord),
    Refreshed(ContentHash, DistributedDataRecord),
}

fn owner_matches(claimed: &PublicKey, stored_owner: &PubKeyHash) -> bool {
    claimed.hash().as_bytes().ct_eq(stored_owner.as_bytes()).into()
}

/// Store of owner-authenticated data.
pub type AuthenticatedDataStore = DataStore<AuthenticatedPolicy>;
/// Store of mailbox messages.
pub type MailboxDataStore = DataStore<MailboxPolicy>;
/// Store of append-only data.
pub type AppendOnlyDataStore = DataStore<AppendOnlyPolicy>;

/// Durable, bounded, replay-resistant store for one category.
pub struct DataStore<P: StorePolicy> {
    meta: MetaData,
    inner: Mutex<Inner>,
    persistence: Persistence,
    listeners: RwLock<Vec<Arc<dyn StoreListener>>>,
    metrics: Arc<Metrics>,
    tombstone_max_age_ms: u64,
    shutdown_flush_timeout: Duration,
    _policy: PhantomData<fn() -> P>,
}

impl<P: StorePolicy> DataStore<P> {
    /// Open the store in `dir`, load what was persisted and drop anything already expired.
    pub fn open(
        dir: &Path,
        meta: MetaData,
        cfg: &StorageConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PersistenceError> {
        fs::create_dir_all(dir).map_err(|_| PersistenceError::DbOpen)?;
        let label = format!("{}/{}", P::STORE_TYPE.store_name(), meta.category);
        let persistence = Persistence::open(dir, label, cfg.flush_every_ms, metrics.clone())?;
        Self::with_persistence(persistence, meta, cfg, metrics)
    }

    /// Build the store over `persistence`, load what it holds and drop anything already expired.
    pub fn with_persistence(
        persistence: Persistence,
        meta: MetaData,
        cfg: &StorageConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PersistenceError> {
        let loaded = persistence.load()?;

        let mut inner = Inner::default();
        for (key, entry) in loaded.records {
            inner.records.insert(key, entry);
        }
        for (owner, seq) in loaded.sequences {
            inner.sequences.insert(owner, seq);
        }
        info!(
            store = P::STORE_TYPE.store_name(),
            category = %meta.category,
            records = inner.records.len(),
            owners = inner.sequences.len(),
            "data store opened"
        );

        let store = Self {
            meta,
            inner: Mutex::new(inner),
            persistence,
            listeners: RwLock::new(Vec::new()),
            metrics,
            tombstone_max_age_ms: cfg.tombstone_max_age_ms(),
            shutdown_flush_timeout: cfg.shutdown_flush_timeout(),
            _policy: PhantomData,
        };
        store.prune_expired(now_ms());
        Ok(store)
    }

    /// Category descriptor.
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// How long an idle owner's sequence is kept. `None` keeps it forever.
    fn sequence_retention_ms(&self) -> Option<u64> {
        self.meta.ttl().map(|ttl| ttl.max(self.tombstone_max_age_ms))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Store a record under its content hash.
    pub fn put(&self, key: ContentHash, record: DistributedDataRecord) -> PutOutcome {
        self.put_at(key, record, now_ms())
    }

    /// [`DataStore::put`] with an explicit clock.
    pub fn put_at(&self, key: ContentHash, record: DistributedDataRecord, now: u64) -> PutOutcome {
        let outcome = self.put_inner(key, record, now);
        let label = match outcome {
            PutOutcome::Added => "added",
            PutOutcome::Refreshed => "refreshed",
            PutOutcome::Rejected(r) => r.as_str(),
        };
        self.metrics
            .store_put_total
            .with_label_values(&[P::STORE_TYPE.store_name(), label])
            .inc();
        outcome
    }

    fn validate(&self, key: &ContentHash, record: &DistributedDataRecord, now: u64) -> Result<(), RejectReason> {
        if ContentHash::of(&record.payload) != *key {
            return Err(RejectReason::HashMismatch);
        }
        if record.payload.len() > self.meta.max_payload_bytes {
            return Err(RejectReason::PayloadTooLarge);
        }
        if self.meta.is_expired(record.created_ms, now) {
            return Err(RejectReason::Expired);
        }
        if !owner_matches(&record.owner_public_key, &record.owner_pub_key_hash) {
            return Err(RejectReason::PublicKeyHashMismatch);
        }
        let msg = add_signing_bytes(&self.meta.category, key, record.sequence_number, record.created_ms);
        verify(&record.owner_public_key, &msg, &record.signature).map_err(|_| RejectReason::InvalidSignature)
    }

    fn put_inner(&self, key: ContentHash, record: DistributedDataRecord, now: u64) -> PutOutcome {
        if let Err(reason) = self.validate(&key, &record, now) {
            match reason {
                RejectReason::InvalidSignature | RejectReason::PublicKeyHashMismatch => {
                    warn!(category = %self.meta.category, %key, %reason, "rejected put")
                }
                _ => info!(category = %self.meta.category, %key, %reason, "rejected put"),
            }
            return PutOutcome::Rejected(reason);
        }

        let owner = record.owner_pub_key_hash;
        let mut ops = Vec::with_capacity(3);
        let mut evicted = None;
        let outcome = {
            let mut inner = self.lock();

            let existing = inner.records.get(&key);
            if let Some(existing) = existing {
                if existing.record == record || !P::updates_in_place() {
                    debug!(category = %self.meta.category, %key, "record already stored");
                    return PutOutcome::Rejected(RejectReason::AlreadyStored);
                }
                if existing.record.owner_pub_key_hash != owner {
                    warn!(category = %self.meta.category, %key, "put for a key owned by someone else");
                    return PutOutcome::Rejected(RejectReason::PublicKeyHashMismatch);
                }
            }
            let is_update = existing.is_some();

            if inner.is_stale(&owner, record.sequence_number) {
                info!(
                    category = %self.meta.category,
                    %key,
                    seq = record.sequence_number,
                    last = ?inner.last_sequence(&owner),
                    "rejected put: stale sequence number"
                );
                return PutOutcome::Rejected(RejectReason::StaleSequenceNumber);
            }

            if !is_update && inner.records.len() >= self.meta.max_item_count {
                let weakest = if P::evicts_on_capacity() {
                    inner
                        .records
                        .iter()
                        .min_by(|a, b| P::eviction_rank(&a.1.record, &b.1.record))
                        .map(|(k, e)| (*k, e.record.cost_factor))
                } else {
                    None
                };
                match weakest {
                    Some((weak_key, weak_cost)) if record.cost_factor > weak_cost => {
                        if let Some(weak) = inner.records.remove(&weak_key) {
                            evicted = Some((weak_key, weak.record));
                        }
                        ops.push(KvOp::del_record(&weak_key));
                    }
                    _ => {
                        info!(category = %self.meta.category, %key, "rejected put: store at capacity");
                        return PutOutcome::Rejected(RejectReason::Capacity);
                    }
                }
            }

            let entry = StoredEntry::new(record.clone());
            match KvOp::put_record(&key, &entry) {
                Ok(op) => ops.push(op),
                Err(e) => warn!(category = %self.meta.category, %key, ?e, "cannot encode record for persistence"),
            }
            match inner.advance(owner, record.sequence_number, now) {
                Ok(op) => ops.push(op),
                Err(e) => warn!(category = %self.meta.category, ?e, "cannot encode sequence for persistence"),
            }
            inner.records.insert(key, entry);
            // Queued under the lock so the writer sees mutations in the order they were applied.
            self.persistence.persist(ops);

            if is_update {
                PutOutcome::Refreshed
            } else {
                PutOutcome::Added
            }
        };

        if let Some((weak_key, weak)) = evicted {
            self.metrics
                .store_evicted_total
                .with_label_values(&[P::STORE_TYPE.store_name()])
                .inc();
            debug!(category = %self.meta.category, evicted = %weak_key, "evicted weakest record");
            self.notify(Notify::Removed(weak_key, weak));
        }
        self.notify(match outcome {
            PutOutcome::Refreshed => Notify::Refreshed(key, record),
            _ => Notify::Added(key, record),
        });
        outcome
    }

    /// Remove a record, authorized by its owner.
    pub fn remove(&self, key: &ContentHash, proof: &RemovalProof) -> RemoveOutcome {
        self.remove_at(key, proof, now_ms())
    }

    /// [`DataStore::remove`] with an explicit clock.
    pub fn remove_at(&self, key: &ContentHash, proof: &RemovalProof, now: u64) -> RemoveOutcome {
        if !P::supports_remove() {
            return RemoveOutcome::Rejected(RejectReason::NotSupported);
        }
        let msg = remove_signing_bytes(&self.meta.category, key, proof.sequence_number);
        if verify(&proof.owner_public_key, &msg, &proof.signature).is_err() {
            warn!(category = %self.meta.category, %key, "rejected remove: invalid signature");
            return RemoveOutcome::Rejected(RejectReason::InvalidSignature);
        }

        let mut ops = Vec::with_capacity(2);
        let removed = {
            let mut inner = self.lock();
            let Some(owner) = inner.records.get(key).map(|e| e.record.owner_pub_key_hash) else {
                if P::records_unknown_removals() {
                    let owner = proof.owner_public_key.hash();
                    if !inner.is_stale(&owner, proof.sequence_number) {
                        match inner.advance(owner, proof.sequence_number, now) {
                            Ok(op) => ops.push(op),
                            Err(e) => warn!(category = %self.meta.category, ?e, "cannot encode sequence for persistence"),
                        }
                    }
                }
                self.persistence.persist(ops);
                drop(inner);
                debug!(category = %self.meta.category, %key, "remove: no entry");
                return RemoveOutcome::NotFound;
            };
            if !owner_matches(&proof.owner_public_key, &owner) {
                warn!(category = %self.meta.category, %key, "rejected remove: not the owner");
                return RemoveOutcome::Rejected(RejectReason::PublicKeyHashMismatch);
            }
            if inner.is_stale(&owner, proof.sequence_number) {
                info!(category = %self.meta.category, %key, seq = proof.sequence_number, "rejected remove: stale sequence number");
                return RemoveOutcome::Rejected(RejectReason::StaleSequenceNumber);
            }
            let removed = inner.records.remove(key);
            ops.push(KvOp::del_record(key));
            match inner.advance(owner, proof.sequence_number, now) {
                Ok(op) => ops.push(op),
                Err(e) => warn!(category = %self.meta.category, ?e, "cannot encode sequence for persistence"),
            }
            self.persistence.persist(ops);
            removed
        };

        self.metrics
            .store_removed_total
            .with_label_values(&[P::STORE_TYPE.store_name()])
            .inc();
        if let Some(entry) = removed {
            self.notify(Notify::Removed(*key, entry.record));
        }
        RemoveOutcome::Removed
    }

    /// Extend a record's lifetime, authorized by its owner.
    pub fn refresh(&self, key: &ContentHash, proof: &RefreshProof) -> RefreshOutcome {
        self.refresh_at(key, proof, now_ms())
    }

    /// [`DataStore::refresh`] with an explicit clock.
    pub fn refresh_at(&self, key: &ContentHash, proof: &RefreshProof, now: u64) -> RefreshOutcome {
        if !P::supports_refresh() {
            return RefreshOutcome::Rejected(RejectReason::NotSupported);
        }
        let msg = refresh_signing_bytes(&self.meta.category, key, proof.sequence_number);
        if verify(&proof.owner_public_key, &msg, &proof.signature).is_err() {
            warn!(category = %self.meta.category, %key, "rejected refresh: invalid signature");
            return RefreshOutcome::Rejected(RejectReason::InvalidSignature);
        }

        let mut ops = Vec::with_capacity(2);
        let refreshed = {
            let mut inner = self.lock();
            let Some(owner) = inner.records.get(key).map(|e| e.record.owner_pub_key_hash) else {
                return RefreshOutcome::NotFound;
            };
            if !owner_matches(&proof.owner_public_key, &owner) {
                warn!(category = %self.meta.category, %key, "rejected refresh: not the owner");
                return RefreshOutcome::Rejected(RejectReason::PublicKeyHashMismatch);
            }
            if inner.is_stale(&owner, proof.sequence_number) {
                info!(category = %self.meta.category, %key, seq = proof.sequence_number, "rejected refresh: stale sequence number");
                return RefreshOutcome::Rejected(RejectReason::StaleSequenceNumber);
            }
            match inner.advance(owner, proof.sequence_number, now) {
                Ok(op) => ops.push(op),
                Err(e) => warn!(category = %self.meta.category, ?e, "cannot encode sequence for persistence"),
            }
            let Some(entry) = inner.records.get_mut(key) else {
                return RefreshOutcome::NotFound;
            };
            entry.ttl_anchor_ms = now;
            match KvOp::put_record(key, entry) {
                Ok(op) => ops.push(op),
                Err(e) => warn!(category = %self.meta.category, %key, ?e, "cannot encode record for persistence"),
            }
            let refreshed = entry.record.clone();
            self.persistence.persist(ops);
            refreshed
        };

        self.metrics
            .store_refreshed_total
            .with_label_values(&[P::STORE_TYPE.store_name()])
            .inc();
        self.notify(Notify::Refreshed(*key, refreshed));
        RefreshOutcome::Refreshed
    }

    /// Record stored under `key`.
    pub fn get(&self, key: &ContentHash) -> Option<DistributedDataRecord> {
        self.lock().records.get(key).map(|e| e.record.clone())
    }

    /// Snapshot of all records.
    pub fn get_all(&self) -> Vec<DistributedDataRecord> {
        self.lock().records.values().map(|e| e.record.clone()).collect()
    }

    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<ContentHash> {
        self.lock().records.keys().copied().collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// True if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest accepted sequence number of `owner`, if any is remembered.
    pub fn last_sequence_number(&self, owner: &PubKeyHash) -> Option<i64> {
        self.lock().last_sequence(owner)
    }

    /// Remove every record whose TTL window closed before `now`. Returns the number removed.
    ///
    /// Sequence bookkeeping past its retention is forgotten in the same pass unless the owner
    /// still has live records.
    pub fn prune_expired(&self, now: u64) -> usize {
        let mut ops = Vec::new();
        let pruned = {
            let mut inner = self.lock();
            let before = inner.records.len();
            let meta = &self.meta;
            inner.records.retain(|key, entry| {
                let keep = !meta.is_expired(entry.ttl_anchor_ms, now);
                if !keep {
                    ops.push(KvOp::del_record(key));
                }
                keep
            });
            let pruned = before - inner.records.len();

            let live_owners: HashSet<PubKeyHash> =
                inner.records.values().map(|e| e.record.owner_pub_key_hash).collect();
            let retention = self.sequence_retention_ms();
            inner.sequences.retain(|owner, seq| {
                let keep = live_owners.contains(owner)
                    || retention.map_or(true, |r| now.saturating_sub(seq.updated_ms) <= r);
                if !keep {
                    ops.push(KvOp::del_sequence(owner));
                }
                keep
            });
            self.persistence.persist(ops);
            pruned
        };

        if pruned > 0 {
            self.metrics
                .store_pruned_total
                .with_label_values(&[P::STORE_TYPE.store_name()])
                .inc_by(pruned as u64);
            info!(category = %self.meta.category, pruned, "pruned expired records");
        }
        pruned
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn StoreListener>) {
        match self.listeners.write() {
            Ok(mut l) => l.push(listener),
            Err(p) => p.into_inner().push(listener),
        }
    }

    /// Unregister a listener previously added.
    pub fn remove_listener(&self, listener: &Arc<dyn StoreListener>) {
        let mut l = match self.listeners.write() {
            Ok(l) => l,
            Err(p) => p.into_inner(),
        };
        l.retain(|x| !Arc::ptr_eq(x, listener));
    }

    fn notify(&self, event: Notify) {
        let listeners = match self.listeners.read() {
            Ok(l) => l.clone(),
            Err(p) => p.into_inner().clone(),
        };
        for l in listeners.iter() {
            match &event {
                Notify::Added(k, r) => l.on_added(k, r),
                Notify::Removed(k, r) => l.on_removed(k, r),
                Notify::Refreshed(k, r) => l.on_refreshed(k, r),
            }
        }
    }

    /// Flush pending writes (bounded) and release the database.
    pub fn shutdown(&self) -> Result<(), PersistenceError> {
        let res = self.persistence.shutdown(self.shutdown_flush_timeout);
        match &res {
            Ok(()) => debug!(category = %self.meta.category, "data store shut down"),
            Err(e) => warn!(category = %self.meta.category, ?e, "data store shutdown flush failed"),
        }
        res
    }
}
