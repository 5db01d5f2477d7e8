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
use meshdata::core::metadata::{MetaData, Priority};
use meshdata::core::security::signing::Ed25519Signer;
use meshdata::core::types::now_ms;
use meshdata::monitoring::metrics::Metrics;
use meshdata::storage::data_store::{AuthenticatedDataStore, MailboxDataStore};
use meshdata::storage::record::{DistributedDataRecord, PutOutcome, RejectReason};
use proptest::prelude::*;
use std::sync::Arc;

fn open_store(dir: &tempfile::TempDir, meta: &MetaData) -> AuthenticatedDataStore {
    let metrics = Arc::new(Metrics::new().unwrap());
    AuthenticatedDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_replayed_sequence_rejected(
        n in 0i64..1_000_000,
        back in 0i64..1_000,
        first in proptest::collection::vec(any::<u8>(), 1..64),
        second in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assume!(first != second);
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaData::new("Offer", 60_000, Priority::Normal);
        let store = open_store(&dir, &meta);
        let signer = Ed25519Signer::generate().unwrap();
        let now = now_ms();

        let accepted = DistributedDataRecord::signed_at(&signer, &meta, first.clone(), n, 0.5, now).unwrap();
        prop_assert_eq!(store.put_at(accepted.key(), accepted, now), PutOutcome::Added);

        // Same owner, any payload, sequence at or below n.
        for payload in [first, second] {
            let replay = DistributedDataRecord::signed_at(&signer, &meta, payload, n - back, 0.5, now + 1).unwrap();
            prop_assert_eq!(
                store.put_at(replay.key(), replay, now + 1),
                PutOutcome::Rejected(RejectReason::StaleSequenceNumber)
            );
        }
    }

    #[test]
    fn prop_prune_is_idempotent(
        ages in proptest::collection::vec(0u64..4_000, 1..12),
        at in 0u64..5_000,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaData::new("Presence", 2_000, Priority::Low);
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = MailboxDataStore::open(dir.path(), meta.clone(), &StorageConfig::default(), metrics).unwrap();
        let signer = Ed25519Signer::generate().unwrap();
        let base = now_ms();

        for (i, age) in ages.iter().enumerate() {
            let created = base + 4_000 - age;
            let r = DistributedDataRecord::signed_at(
                &signer, &meta, format!("item-{i}").into_bytes(), i as i64, 0.5, created,
            ).unwrap();
            prop_assert!(store.put_at(r.key(), r, created).is_accepted());
        }

        let now = base + at + 2_000;
        store.prune_expired(now);
        let mut after_first = store.keys();
        after_first.sort();

        prop_assert_eq!(store.prune_expired(now), 0);
        let mut after_second = store.keys();
        after_second.sort();
        prop_assert_eq!(after_first, after_second);
    }
}
