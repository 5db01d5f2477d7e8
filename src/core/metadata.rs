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

//! Static descriptors for categories of distributed data.
//!
//! The `category` string is the on-disk identity of a store: the same category always maps to
//! the same store directory, so names such as `"AuthorizedOracleNode"` or `"ChatMessage"` must
//! never be renamed without migrating the persisted data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for "never expires".
pub const NO_TTL: i64 = -1;

/// 10 days.
pub const TTL_10_DAYS: i64 = 10 * 24 * 60 * 60 * 1000;
/// 15 days.
pub const TTL_15_DAYS: i64 = 15 * 24 * 60 * 60 * 1000;
/// 30 days.
pub const TTL_30_DAYS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Default maximum entries per category store.
pub const MAX_ITEM_COUNT_10_000: usize = 10_000;
/// Default maximum payload size for one record.
pub const MAX_PAYLOAD_BYTES_DEFAULT: usize = 20_000;

/// Relative importance of a category. Ordered from lowest to highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Low.
    Low,
    /// Normal.
    Normal,
    /// High.
    High,
    /// Highest.
    Highest,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Immutable descriptor of a data category.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    /// Time to live in milliseconds, [`NO_TTL`] for unbounded.
    pub ttl_ms: i64,
    /// Maximum size of a single record payload.
    pub max_payload_bytes: usize,
    /// Maximum number of records kept for the category.
    pub max_item_count: usize,
    /// Category name; the registry key and the store directory name.
    pub category: String,
    /// Priority of the category.
    pub priority: Priority,
}

impl MetaData {
    /// Create metadata with default size bounds.
    pub fn new(category: impl Into<String>, ttl_ms: i64, priority: Priority) -> Self {
        Self {
            ttl_ms,
            max_payload_bytes: MAX_PAYLOAD_BYTES_DEFAULT,
            max_item_count: MAX_ITEM_COUNT_10_000,
            category: category.into(),
            priority,
        }
    }

    /// Override the per-record payload bound.
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    /// Override the entry-count bound.
    pub fn with_max_item_count(mut self, max: usize) -> Self {
        self.max_item_count = max;
        self
    }

    /// TTL if the category expires at all.
    pub fn ttl(&self) -> Option<u64> {
        if self.ttl_ms < 0 {
            None
        } else {
            Some(self.ttl_ms as u64)
        }
    }

    /// True if a record created at `created_ms` is past its deadline at `now_ms`.
    pub fn is_expired(&self, created_ms: u64, now_ms: u64) -> bool {
        match self.ttl() {
            None => false,
            Some(ttl) => created_ms.saturating_add(ttl) < now_ms,
        }
    }
}

impl fmt::Display for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(ttl={}ms, priority={:?})", self.category, self.ttl_ms, self.priority)
    }
}
