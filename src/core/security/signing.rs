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

//! Domain-separated signing bytes for store requests, plus Ed25519 signing and verification.
//!
//! Every proof binds the category, the content hash and the sequence number, so a signature
//! for one store or one operation can never be replayed against another.

use crate::core::types::{ContentHash, PublicKey, Signature};
use ring::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use thiserror::Error;

/// Signing error.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Key material could not be generated or parsed.
    #[error("invalid key")]
    InvalidKey,
    /// Signature did not verify.
    #[error("bad signature")]
    BadSignature,
}

const ADD_DOMAIN: &[u8] = b"meshdata-add-v1";
const REMOVE_DOMAIN: &[u8] = b"meshdata-remove-v1";
const REFRESH_DOMAIN: &[u8] = b"meshdata-refresh-v1";

fn base_bytes(domain: &[u8], category: &str, key: &ContentHash, sequence_number: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(domain.len() + 4 + category.len() + 32 + 8 + 8);
    out.extend_from_slice(domain);
    out.extend_from_slice(&(category.len() as u32).to_be_bytes());
    out.extend_from_slice(category.as_bytes());
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(&sequence_number.to_be_bytes());
    out
}

/// Add payload: domain || len(category) || category || content_hash || sequence_number || created_ms
pub fn add_signing_bytes(
    category: &str,
    key: &ContentHash,
    sequence_number: i64,
    created_ms: u64,
) -> Vec<u8> {
    let mut out = base_bytes(ADD_DOMAIN, category, key, sequence_number);
    out.extend_from_slice(&created_ms.to_be_bytes());
    out
}

/// Remove payload: domain || len(category) || category || content_hash || sequence_number
pub fn remove_signing_bytes(category: &str, key: &ContentHash, sequence_number: i64) -> Vec<u8> {
    base_bytes(REMOVE_DOMAIN, category, key, sequence_number)
}

/// Refresh payload: domain || len(category) || category || content_hash || sequence_number
pub fn refresh_signing_bytes(category: &str, key: &ContentHash, sequence_number: i64) -> Vec<u8> {
    base_bytes(REFRESH_DOMAIN, category, key, sequence_number)
}

/// Verify an Ed25519 signature given raw public key bytes.
pub fn verify(public_key: &PublicKey, msg: &[u8], sig: &Signature) -> Result<(), SigningError> {
    let pk = public_key.as_public_key_bytes().ok_or(SigningError::BadSignature)?;
    // ring requires signature length 64 for Ed25519
    if sig.0.len() != 64 {
        return Err(SigningError::BadSignature);
    }
    UnparsedPublicKey::new(&ED25519, pk)
        .verify(msg, &sig.0)
        .map_err(|_| SigningError::BadSignature)
}

/// Signer backend abstraction (HSM compatible).
pub trait SignerBackend: Send + Sync {
    /// Return public key bytes (Ed25519, 32 bytes).
    fn public_key(&self) -> PublicKey;
    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Signature, SigningError>;
}

/// In-memory Ed25519 signer used by publishers of distributed data.
pub struct Ed25519Signer {
    keypair: Ed25519KeyPair,
}

impl Ed25519Signer {
    /// Generate a fresh keypair.
    pub fn generate() -> Result<Self, SigningError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| SigningError::InvalidKey)?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Load from PKCS#8 bytes.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, SigningError> {
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8).map_err(|_| SigningError::InvalidKey)?;
        Ok(Self { keypair })
    }
}

impl SignerBackend for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        PublicKey(self.keypair.public_key().as_ref().to_vec())
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, SigningError> {
        Ok(Signature(self.keypair.sign(msg).as_ref().to_vec()))
    }
}
