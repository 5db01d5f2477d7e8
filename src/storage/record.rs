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

//! Distributed data records, ownership proofs and store outcomes.

use crate::core::{
    metadata::MetaData,
    security::signing::{
        add_signing_bytes, refresh_signing_bytes, remove_signing_bytes, SignerBackend,
        SigningError,
    },
    types::{now_ms, ContentHash, PubKeyHash, PublicKey, Signature},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One signed item of distributed data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistributedDataRecord {
    /// Opaque payload; its SHA-256 is the store key.
    pub payload: Vec<u8>,
    /// SHA-256 of `owner_public_key`.
    pub owner_pub_key_hash: PubKeyHash,
    /// Owner's Ed25519 public key.
    pub owner_public_key: PublicKey,
    /// Per-owner monotonically increasing counter.
    pub sequence_number: i64,
    /// Creation time (ms since UNIX epoch); TTL is measured from here.
    pub created_ms: u64,
    /// Proof-of-work/bond weight, breaks capacity ties in favor of costlier data.
    pub cost_factor: f64,
    /// Owner signature over [`add_signing_bytes`].
    pub signature: Signature,
}

impl DistributedDataRecord {
    /// Build and sign a record for `meta.category`, stamped with the current time.
    pub fn signed<S: SignerBackend + ?Sized>(
        signer: &S,
        meta: &MetaData,
        payload: Vec<u8>,
        sequence_number: i64,
        cost_factor: f64,
    ) -> Result<Self, SigningError> {
        Self::signed_at(signer, meta, payload, sequence_number, cost_factor, now_ms())
    }

    /// Build and sign a record with an explicit creation time.
    pub fn signed_at<S: SignerBackend + ?Sized>(
        signer: &S,
        meta: &MetaData,
        payload: Vec<u8>,
        sequence_number: i64,
        cost_factor: f64,
        created_ms: u64,
    ) -> Result<Self, SigningError> {
        let owner_public_key = signer.public_key();
        let key = ContentHash::of(&payload);
        let signature = signer.sign(&add_signing_bytes(&meta.category, &key, sequence_number, created_ms))?;
        Ok(Self {
            payload,
            owner_pub_key_hash: owner_public_key.hash(),
            owner_public_key,
            sequence_number,
            created_ms,
            cost_factor,
            signature,
        })
    }

    /// Store key of this record.
    pub fn key(&self) -> ContentHash {
        ContentHash::of(&self.payload)
    }
}

/// A record as kept by a store.
///
/// The record itself stays exactly as the owner signed it; refreshes move `ttl_anchor_ms`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The signed record.
    pub record: DistributedDataRecord,
    /// Start of the TTL window: `created_ms`, or the time of the last refresh.
    pub ttl_anchor_ms: u64,
}

impl StoredEntry {
    /// Wrap a freshly accepted record.
    pub fn new(record: DistributedDataRecord) -> Self {
        let ttl_anchor_ms = record.created_ms;
        Self { record, ttl_anchor_ms }
    }
}

/// Owner-signed permission to remove a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalProof {
    /// Owner's public key; must hash to the stored `owner_pub_key_hash`.
    pub owner_public_key: PublicKey,
    /// Must exceed the owner's last accepted sequence number.
    pub sequence_number: i64,
    /// Signature over [`remove_signing_bytes`].
    pub signature: Signature,
}

impl RemovalProof {
    /// Sign a removal of `key` in `category`.
    pub fn signed<S: SignerBackend + ?Sized>(
        signer: &S,
        category: &str,
        key: &ContentHash,
        sequence_number: i64,
    ) -> Result<Self, SigningError> {
        let signature = signer.sign(&remove_signing_bytes(category, key, sequence_number))?;
        Ok(Self { owner_public_key: signer.public_key(), sequence_number, signature })
    }
}

/// Owner-signed permission to extend a record's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshProof {
    /// Owner's public key; must hash to the stored `owner_pub_key_hash`.
    pub owner_public_key: PublicKey,
    /// Must exceed the owner's last accepted sequence number.
    pub sequence_number: i64,
    /// Signature over [`refresh_signing_bytes`].
    pub signature: Signature,
}

impl RefreshProof {
    /// Sign a refresh of `key` in `category`.
    pub fn signed<S: SignerBackend + ?Sized>(
        signer: &S,
        category: &str,
        key: &ContentHash,
        sequence_number: i64,
    ) -> Result<Self, SigningError> {
        let signature = signer.sign(&refresh_signing_bytes(category, key, sequence_number))?;
        Ok(Self { owner_public_key: signer.public_key(), sequence_number, signature })
    }
}

/// Last accepted sequence number of one owner in one category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSequence {
    /// Highest accepted sequence number.
    pub sequence_number: i64,
    /// When it was accepted (ms since UNIX epoch).
    pub updated_ms: u64,
}

/// Why a store refused a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Key is not the content hash of the payload.
    HashMismatch,
    /// Payload exceeds the category bound.
    PayloadTooLarge,
    /// Record is already past its TTL.
    Expired,
    /// Public key does not hash to the claimed owner.
    PublicKeyHashMismatch,
    /// Signature does not verify.
    InvalidSignature,
    /// Identical record already stored, or an append-only key already exists.
    AlreadyStored,
    /// Sequence number not above the owner's last accepted one.
    StaleSequenceNumber,
    /// Store is full and the record does not outrank the weakest entry.
    Capacity,
    /// Operation not offered by this store family.
    NotSupported,
}

impl RejectReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::HashMismatch => "HASH_MISMATCH",
            RejectReason::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            RejectReason::Expired => "EXPIRED",
            RejectReason::PublicKeyHashMismatch => "PUBLIC_KEY_HASH_MISMATCH",
            RejectReason::InvalidSignature => "INVALID_SIGNATURE",
            RejectReason::AlreadyStored => "ALREADY_STORED",
            RejectReason::StaleSequenceNumber => "STALE_SEQUENCE_NUMBER",
            RejectReason::Capacity => "CAPACITY",
            RejectReason::NotSupported => "NOT_SUPPORTED",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `put`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// New key stored.
    Added,
    /// Existing key replaced with a newer sequence number.
    Refreshed,
    /// Refused.
    Rejected(RejectReason),
}

impl PutOutcome {
    /// True for `Added` and `Refreshed`.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, PutOutcome::Rejected(_))
    }
}

/// Result of `remove`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Record removed.
    Removed,
    /// Nothing stored under the key.
    NotFound,
    /// Refused.
    Rejected(RejectReason),
}

/// Result of `refresh`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Lifetime extended.
    Refreshed,
    /// Nothing stored under the key.
    NotFound,
    /// Refused.
    Rejected(RejectReason),
}

/// Inbound add, tagged with the store family it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum AddDataRequest {
    /// Owner-authenticated data.
    Authenticated {
        /// Category descriptor.
        meta: MetaData,
        /// The record.
        record: DistributedDataRecord,
    },
    /// Message for an offline recipient.
    Mailbox {
        /// Category descriptor.
        meta: MetaData,
        /// The record.
        record: DistributedDataRecord,
    },
    /// Add-only data.
    AppendOnly {
        /// Category descriptor.
        meta: MetaData,
        /// The record.
        record: DistributedDataRecord,
    },
}

impl AddDataRequest {
    /// Category descriptor of the request.
    pub fn meta(&self) -> &MetaData {
        match self {
            AddDataRequest::Authenticated { meta, .. }
            | AddDataRequest::Mailbox { meta, .. }
            | AddDataRequest::AppendOnly { meta, .. } => meta,
        }
    }
}
