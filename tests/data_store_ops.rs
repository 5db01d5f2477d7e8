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

use meshdata::core::config::StorageConfig;
use meshdata::core::metadata::{MetaData, Priority, NO_TTL, TTL_10_DAYS, TTL_30_DAYS};
use meshdata::core::security::signing::{Ed25519Signer, SignerBackend};
use meshdata::core::types::{now_ms, ContentHash, PublicKey, Signature};
use meshdata::monitoring::metrics::Metrics;
use meshdata::storage::data_store::{
    AppendOnlyDataStore, AuthenticatedDataStore, MailboxDataStore, StoreListener,
};
use meshdata::storage::record::{
    DistributedDataRecord, PutOutcome, RefreshOutcome, RefreshProof, RejectReason, RemovalProof,
    RemoveOutcome,
};
use std::sync::{Arc, Mutex};

fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().unwrap())
}

fn meta() -> MetaData {
    MetaData::new("ChatMessage", TTL_10_DAYS, Priority::Normal)
}

fn record(s: &Ed25519Signer, meta: &MetaData, payload: &[u8], seq: i64, cost: f64, created: u64) -> DistributedDataRecord {
    DistributedDataRecord::signed_at(s, meta, payload.to_vec(), seq, cost, created).unwrap()
}

#[test]
fn test_put_add_then_update_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta();
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let signer = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r1 = record(&signer, &meta, b"offer", 1, 0.5, now);
    let key = r1.key();
    assert_eq!(store.put_at(key, r1.clone(), now), PutOutcome::Added);
    assert_eq!(store.get(&key), Some(r1.clone()));

    assert_eq!(store.put_at(key, r1, now), PutOutcome::Rejected(RejectReason::AlreadyStored));

    let r2 = record(&signer, &meta, b"offer", 2, 0.5, now + 1);
    assert_eq!(store.put_at(key, r2.clone(), now + 1), PutOutcome::Refreshed);
    assert_eq!(store.get(&key), Some(r2));
    assert_eq!(store.len(), 1);
    assert_eq!(store.last_sequence_number(&signer.public_key().hash()), Some(2));
}

#[test]
fn test_put_rejections_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta().with_max_payload_bytes(8);
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let signer = Ed25519Signer::generate().unwrap();
    let other = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r = record(&signer, &meta, b"abc", 1, 0.5, now);
    assert_eq!(
        store.put_at(ContentHash::of(b"xyz"), r.clone(), now),
        PutOutcome::Rejected(RejectReason::HashMismatch)
    );

    let big = record(&signer, &meta, b"way too large", 1, 0.5, now);
    assert_eq!(store.put_at(big.key(), big, now), PutOutcome::Rejected(RejectReason::PayloadTooLarge));

    let old_created = now - TTL_10_DAYS as u64 - 1;
    let old = record(&signer, &meta, b"old", 1, 0.5, old_created);
    assert_eq!(store.put_at(old.key(), old, now), PutOutcome::Rejected(RejectReason::Expired));

    let mut foreign_key = r.clone();
    foreign_key.owner_public_key = other.public_key();
    assert_eq!(
        store.put_at(foreign_key.key(), foreign_key, now),
        PutOutcome::Rejected(RejectReason::PublicKeyHashMismatch)
    );

    let mut bad_sig = r.clone();
    bad_sig.signature = Signature(vec![0u8; 64]);
    assert_eq!(store.put_at(bad_sig.key(), bad_sig, now), PutOutcome::Rejected(RejectReason::InvalidSignature));

    let mut tampered = r.clone();
    tampered.sequence_number = 7;
    assert_eq!(store.put_at(tampered.key(), tampered, now), PutOutcome::Rejected(RejectReason::InvalidSignature));

    assert!(store.is_empty());
    assert_eq!(store.put_at(r.key(), r, now), PutOutcome::Added);
}

#[test]
fn test_put_for_key_of_other_owner_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta();
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let alice = Ed25519Signer::generate().unwrap();
    let mallory = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r = record(&alice, &meta, b"same payload", 1, 0.5, now);
    assert_eq!(store.put_at(r.key(), r.clone(), now), PutOutcome::Added);

    let hijack = record(&mallory, &meta, b"same payload", 5, 0.5, now);
    assert_eq!(
        store.put_at(hijack.key(), hijack, now),
        PutOutcome::Rejected(RejectReason::PublicKeyHashMismatch)
    );
    assert_eq!(store.get(&r.key()), Some(r));
}

#[test]
fn test_capacity_evicts_weakest_only_when_outranked() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta().with_max_item_count(2);
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let signer = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let a = record(&signer, &meta, b"a", 1, 0.5, now);
    let b = record(&signer, &meta, b"b", 2, 0.7, now + 1);
    assert_eq!(store.put_at(a.key(), a.clone(), now + 1), PutOutcome::Added);
    assert_eq!(store.put_at(b.key(), b.clone(), now + 1), PutOutcome::Added);

    let equal = record(&signer, &meta, b"c", 3, 0.5, now + 2);
    assert_eq!(store.put_at(equal.key(), equal, now + 2), PutOutcome::Rejected(RejectReason::Capacity));

    let strong = record(&signer, &meta, b"d", 4, 0.9, now + 3);
    assert_eq!(store.put_at(strong.key(), strong.clone(), now + 3), PutOutcome::Added);
    assert_eq!(store.len(), 2);
    assert!(store.get(&a.key()).is_none());
    assert!(store.get(&b.key()).is_some());
    assert!(store.get(&strong.key()).is_some());
}

#[test]
fn test_append_only_never_updates_removes_or_evicts() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaData::new("TradeStatistics", NO_TTL, Priority::Low).with_max_item_count(1);
    let store = AppendOnlyDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let signer = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r1 = record(&signer, &meta, b"stat-1", 1, 0.1, now);
    assert_eq!(store.put_at(r1.key(), r1.clone(), now), PutOutcome::Added);

    let r1_newer = record(&signer, &meta, b"stat-1", 2, 0.1, now);
    assert_eq!(store.put_at(r1.key(), r1_newer, now), PutOutcome::Rejected(RejectReason::AlreadyStored));

    let r2 = record(&signer, &meta, b"stat-2", 3, 1.0, now);
    assert_eq!(store.put_at(r2.key(), r2, now), PutOutcome::Rejected(RejectReason::Capacity));

    let rm = RemovalProof::signed(&signer, &meta.category, &r1.key(), 10).unwrap();
    assert_eq!(store.remove_at(&r1.key(), &rm, now), RemoveOutcome::Rejected(RejectReason::NotSupported));
    let rf = RefreshProof::signed(&signer, &meta.category, &r1.key(), 10).unwrap();
    assert_eq!(store.refresh_at(&r1.key(), &rf, now), RefreshOutcome::Rejected(RejectReason::NotSupported));
    assert_eq!(store.get(&r1.key()), Some(r1));
}

#[test]
fn test_remove_requires_owner_and_fresh_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta();
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let owner = Ed25519Signer::generate().unwrap();
    let other = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r = record(&owner, &meta, b"listing", 5, 0.5, now);
    let key = r.key();
    assert_eq!(store.put_at(key, r, now), PutOutcome::Added);

    let by_other = RemovalProof::signed(&other, &meta.category, &key, 6).unwrap();
    assert_eq!(store.remove_at(&key, &by_other, now), RemoveOutcome::Rejected(RejectReason::PublicKeyHashMismatch));

    let stale = RemovalProof::signed(&owner, &meta.category, &key, 5).unwrap();
    assert_eq!(store.remove_at(&key, &stale, now), RemoveOutcome::Rejected(RejectReason::StaleSequenceNumber));

    let mut forged = RemovalProof::signed(&owner, &meta.category, &key, 6).unwrap();
    forged.owner_public_key = PublicKey(vec![1u8; 32]);
    assert_eq!(store.remove_at(&key, &forged, now), RemoveOutcome::Rejected(RejectReason::InvalidSignature));

    let ok = RemovalProof::signed(&owner, &meta.category, &key, 6).unwrap();
    assert_eq!(store.remove_at(&key, &ok, now), RemoveOutcome::Removed);
    assert!(store.get(&key).is_none());

    let again = RemovalProof::signed(&owner, &meta.category, &key, 7).unwrap();
    assert_eq!(store.remove_at(&key, &again, now), RemoveOutcome::NotFound);

    // The removed write cannot be replayed.
    let replay = record(&owner, &meta, b"listing", 5, 0.5, now);
    assert_eq!(store.put_at(key, replay, now), PutOutcome::Rejected(RejectReason::StaleSequenceNumber));
}

#[test]
fn test_mailbox_remove_before_add_blocks_late_add() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaData::new("MailboxMessage", TTL_10_DAYS, Priority::High);
    let store = MailboxDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let sender = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let msg = record(&sender, &meta, b"hello", 3, 0.5, now);
    let rm = RemovalProof::signed(&sender, &meta.category, &msg.key(), 4).unwrap();
    assert_eq!(store.remove_at(&msg.key(), &rm, now), RemoveOutcome::NotFound);
    assert_eq!(store.last_sequence_number(&sender.public_key().hash()), Some(4));

    assert_eq!(store.put_at(msg.key(), msg, now), PutOutcome::Rejected(RejectReason::StaleSequenceNumber));
}

#[test]
fn test_authenticated_remove_of_unknown_key_keeps_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta();
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let owner = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r = record(&owner, &meta, b"later", 3, 0.5, now);
    let rm = RemovalProof::signed(&owner, &meta.category, &r.key(), 4).unwrap();
    assert_eq!(store.remove_at(&r.key(), &rm, now), RemoveOutcome::NotFound);
    assert_eq!(store.last_sequence_number(&owner.public_key().hash()), None);
    assert_eq!(store.put_at(r.key(), r, now), PutOutcome::Added);
}

#[test]
fn test_refresh_extends_lifetime() {
    let dir = tempfile::tempdir().unwrap();
    let ttl = 1_000i64;
    let meta = MetaData::new("Heartbeat", ttl, Priority::Normal);
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let owner = Ed25519Signer::generate().unwrap();
    let t0 = now_ms();

    let r = record(&owner, &meta, b"alive", 1, 0.5, t0);
    let key = r.key();
    assert_eq!(store.put_at(key, r.clone(), t0), PutOutcome::Added);

    let rf = RefreshProof::signed(&owner, &meta.category, &key, 2).unwrap();
    assert_eq!(store.refresh_at(&key, &rf, t0 + 900), RefreshOutcome::Refreshed);
    assert_eq!(store.refresh_at(&key, &rf, t0 + 950), RefreshOutcome::Rejected(RejectReason::StaleSequenceNumber));

    // Past the original deadline, within the refreshed one.
    assert_eq!(store.prune_expired(t0 + 1_500), 0);
    assert_eq!(store.get(&key), Some(r));
    assert_eq!(store.prune_expired(t0 + 1_901), 1);

    let missing = RefreshProof::signed(&owner, &meta.category, &key, 3).unwrap();
    assert_eq!(store.refresh_at(&key, &missing, t0 + 2_000), RefreshOutcome::NotFound);
}

#[test]
fn test_prune_keeps_tombstone_until_max_age() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaData::new("Short", 1_000, Priority::Normal);
    let cfg = StorageConfig { tombstone_max_age_secs: 10, ..StorageConfig::default() };
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &cfg, metrics()).unwrap();
    let owner = Ed25519Signer::generate().unwrap();
    let t0 = now_ms();
    let owner_hash = owner.public_key().hash();

    let r = record(&owner, &meta, b"x", 9, 0.5, t0);
    assert_eq!(store.put_at(r.key(), r.clone(), t0), PutOutcome::Added);

    assert_eq!(store.prune_expired(t0 + 2_000), 1);
    assert_eq!(store.last_sequence_number(&owner_hash), Some(9));
    assert_eq!(store.put_at(r.key(), r, t0 + 2_000), PutOutcome::Rejected(RejectReason::Expired));

    assert_eq!(store.prune_expired(t0 + 10_001), 0);
    assert_eq!(store.last_sequence_number(&owner_hash), None);
}

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[test]
fn test_removal_outlives_tombstone_age_when_ttl_is_longer() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaData::new("AccountAgeWitness", TTL_30_DAYS, Priority::Normal);
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let owner = Ed25519Signer::generate().unwrap();
    let owner_hash = owner.public_key().hash();
    let t0 = now_ms();

    let r = record(&owner, &meta, b"witness", 5, 0.5, t0);
    let key = r.key();
    assert_eq!(store.put_at(key, r.clone(), t0), PutOutcome::Added);
    let rm = RemovalProof::signed(&owner, &meta.category, &key, 6).unwrap();
    assert_eq!(store.remove_at(&key, &rm, t0), RemoveOutcome::Removed);

    // Past the default tombstone age, still inside the record's TTL.
    store.prune_expired(t0 + 11 * DAY_MS);
    assert_eq!(store.last_sequence_number(&owner_hash), Some(6));
    assert_eq!(
        store.put_at(key, r.clone(), t0 + 11 * DAY_MS),
        PutOutcome::Rejected(RejectReason::StaleSequenceNumber)
    );

    // Once the TTL has passed too, the old write is refused as expired.
    store.prune_expired(t0 + 31 * DAY_MS);
    assert_eq!(store.last_sequence_number(&owner_hash), None);
    assert_eq!(store.put_at(key, r, t0 + 31 * DAY_MS), PutOutcome::Rejected(RejectReason::Expired));
}

#[test]
fn test_sequence_without_ttl_is_never_forgotten() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaData::new("Filter", NO_TTL, Priority::High);
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let owner = Ed25519Signer::generate().unwrap();
    let t0 = now_ms();

    let r = record(&owner, &meta, b"filter", 1, 0.5, t0);
    let key = r.key();
    assert_eq!(store.put_at(key, r.clone(), t0), PutOutcome::Added);
    let rm = RemovalProof::signed(&owner, &meta.category, &key, 2).unwrap();
    assert_eq!(store.remove_at(&key, &rm, t0), RemoveOutcome::Removed);

    store.prune_expired(t0 + 3_650 * DAY_MS);
    assert_eq!(store.last_sequence_number(&owner.public_key().hash()), Some(2));
    assert_eq!(
        store.put_at(key, r, t0 + 3_650 * DAY_MS),
        PutOutcome::Rejected(RejectReason::StaleSequenceNumber)
    );
}

#[test]
fn test_concurrent_put_and_remove_persist_in_applied_order() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta();
    let owner = Ed25519Signer::generate().unwrap();
    let now = now_ms();
    let puts: Vec<_> = (0..100).map(|i| record(&owner, &meta, b"contested", 2 * i + 1, 0.5, now)).collect();
    let key = puts[0].key();
    let removals: Vec<_> = (0..100)
        .map(|i| RemovalProof::signed(&owner, &meta.category, &key, 2 * i + 2).unwrap())
        .collect();

    let (in_memory, last_seq) = {
        let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for r in &puts {
                    store.put_at(key, r.clone(), now);
                }
            });
            scope.spawn(|| {
                for rm in &removals {
                    store.remove_at(&key, rm, now);
                }
            });
        });
        let state = (store.get(&key), store.last_sequence_number(&owner.public_key().hash()));
        store.shutdown().unwrap();
        state
    };

    let reopened = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    assert_eq!(reopened.get(&key), in_memory);
    assert_eq!(reopened.last_sequence_number(&owner.public_key().hash()), last_seq);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(&'static str, ContentHash)>>,
}

impl StoreListener for Recorder {
    fn on_added(&self, key: &ContentHash, _r: &DistributedDataRecord) {
        self.events.lock().unwrap().push(("added", *key));
    }
    fn on_removed(&self, key: &ContentHash, _r: &DistributedDataRecord) {
        self.events.lock().unwrap().push(("removed", *key));
    }
    fn on_refreshed(&self, key: &ContentHash, _r: &DistributedDataRecord) {
        self.events.lock().unwrap().push(("refreshed", *key));
    }
}

#[test]
fn test_listeners_see_accepted_mutations_only() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta();
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let rec = Arc::new(Recorder::default());
    let listener: Arc<dyn StoreListener> = rec.clone();
    store.add_listener(listener.clone());
    let owner = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let r = record(&owner, &meta, b"p", 1, 0.5, now);
    let key = r.key();
    store.put_at(key, r.clone(), now);
    store.put_at(key, r, now);
    store.refresh_at(&key, &RefreshProof::signed(&owner, &meta.category, &key, 2).unwrap(), now);
    store.remove_at(&key, &RemovalProof::signed(&owner, &meta.category, &key, 3).unwrap(), now);

    store.remove_listener(&listener);
    let r2 = record(&owner, &meta, b"q", 4, 0.5, now);
    store.put_at(r2.key(), r2, now);

    let events = rec.events.lock().unwrap().clone();
    assert_eq!(events, vec![("added", key), ("refreshed", key), ("removed", key)]);
}

#[test]
fn test_capacity_eviction_reported_as_removal() {
    let dir = tempfile::tempdir().unwrap();
    let meta = meta().with_max_item_count(1);
    let store = AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics()).unwrap();
    let rec = Arc::new(Recorder::default());
    store.add_listener(rec.clone());
    let owner = Ed25519Signer::generate().unwrap();
    let now = now_ms();

    let weak = record(&owner, &meta, b"weak", 1, 0.2, now);
    let strong = record(&owner, &meta, b"strong", 2, 0.8, now);
    assert_eq!(store.put_at(weak.key(), weak.clone(), now), PutOutcome::Added);
    assert_eq!(store.put_at(strong.key(), strong.clone(), now), PutOutcome::Added);

    let events = rec.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![("added", weak.key()), ("removed", weak.key()), ("added", strong.key())]
    );
}
