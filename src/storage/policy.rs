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
#![deny(missing_docs)]

//! Behavioral policies for the three store families.
//!
//! The store engine is generic over a [`StorePolicy`]; the policies are zero-sized and only
//! answer questions (may this family update in place, evict, remove, refresh) plus rank
//! entries for capacity eviction.

use crate::storage::record::DistributedDataRecord;
use std::cmp::Ordering;
use std::fmt;

/// Store family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreType {
    /// Owner-authenticated, updatable data.
    Authenticated,
    /// Messages for an offline recipient.
    Mailbox,
    /// Add-only data, expired through TTL.
    AppendOnly,
}

impl StoreType {
    /// Directory name under `<data_dir>/db`.
    pub fn store_name(&self) -> &'static str {
        match self {
            StoreType::Authenticated => "AuthenticatedDataStore",
            StoreType::Mailbox => "MailboxDataStore",
            StoreType::AppendOnly => "AppendOnlyDataStore",
        }
    }

    /// All families.
    pub fn all() -> [StoreType; 3] {
        [StoreType::Authenticated, StoreType::Mailbox, StoreType::AppendOnly]
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.store_name())
    }
}

/// Default capacity ranking: lower cost factor first, then older first.
pub fn rank_by_cost_then_age(a: &DistributedDataRecord, b: &DistributedDataRecord) -> Ordering {
    a.cost_factor
        .total_cmp(&b.cost_factor)
        .then(a.created_ms.cmp(&b.created_ms))
}

/// Family-specific store behavior.
pub trait StorePolicy: Send + Sync + 'static {
    /// Family this policy implements.
    const STORE_TYPE: StoreType;

    /// May a newer record replace an existing key.
    fn updates_in_place() -> bool {
        true
    }

    /// May owners remove records.
    fn supports_remove() -> bool {
        true
    }

    /// May owners extend a record's lifetime.
    fn supports_refresh() -> bool {
        true
    }

    /// May a full store evict its weakest entry for a stronger one.
    fn evicts_on_capacity() -> bool {
        true
    }

    /// Does a removal for an unknown key still advance the owner's sequence number.
    fn records_unknown_removals() -> bool {
        false
    }

    /// Capacity ranking; the minimum is the eviction candidate.
    fn eviction_rank(a: &DistributedDataRecord, b: &DistributedDataRecord) -> Ordering {
        rank_by_cost_then_age(a, b)
    }
}

/// Authenticated data.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthenticatedPolicy;

impl StorePolicy for AuthenticatedPolicy {
    const STORE_TYPE: StoreType = StoreType::Authenticated;
}

/// Mailbox data.
#[derive(Clone, Copy, Debug, Default)]
pub struct MailboxPolicy;

impl StorePolicy for MailboxPolicy {
    const STORE_TYPE: StoreType = StoreType::Mailbox;

    // A removal can overtake the add it refers to; remember its sequence number so the late
    // add is rejected instead of resurrecting a delivered message.
    fn records_unknown_removals() -> bool {
        true
    }
}

/// Append-only data.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppendOnlyPolicy;

impl StorePolicy for AppendOnlyPolicy {
    const STORE_TYPE: StoreType = StoreType::AppendOnly;

    fn updates_in_place() -> bool {
        false
    }

    fn supports_remove() -> bool {
        false
    }

    fn supports_refresh() -> bool {
        false
    }

    fn evicts_on_capacity() -> bool {
        false
    }
}
