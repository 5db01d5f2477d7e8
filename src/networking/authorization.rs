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

//! Authorization token negotiation and dispatch.

use crate::networking::hash_cash::{AuthorizedPayload, HashCashToken, HashCashTokenService, NetworkLoad};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Anti-spam proof scheme stamped on authorized messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationTokenType {
    /// SHA-256 hash cash.
    HashCash,
    /// Memory-hard equihash.
    EquiHash,
}

impl AuthorizationTokenType {
    /// Feature a peer advertises when it speaks this scheme.
    pub fn feature(self) -> Feature {
        match self {
            AuthorizationTokenType::HashCash => Feature::AuthorizationHashCash,
            AuthorizationTokenType::EquiHash => Feature::AuthorizationEquiHash,
        }
    }

    /// Scheme announced by `feature`, if it is an authorization feature.
    pub fn from_feature(feature: Feature) -> Option<Self> {
        match feature {
            Feature::AuthorizationHashCash => Some(AuthorizationTokenType::HashCash),
            Feature::AuthorizationEquiHash => Some(AuthorizationTokenType::EquiHash),
            Feature::InventoryHashSetFilter | Feature::InventoryMinerFilter => None,
        }
    }
}

impl fmt::Display for AuthorizationTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationTokenType::HashCash => f.write_str("HASH_CASH"),
            AuthorizationTokenType::EquiHash => f.write_str("EQUI_HASH"),
        }
    }
}

/// Capability advertised by a peer during the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Accepts hash-cash tokens.
    AuthorizationHashCash,
    /// Accepts equihash tokens.
    AuthorizationEquiHash,
    /// Inventory filtering by hash set.
    InventoryHashSetFilter,
    /// Inventory filtering by miner.
    InventoryMinerFilter,
}

/// Pick the token scheme for a connection.
///
/// The first entry of `my_preferred` the peer advertises wins. If none is advertised, the
/// first scheme derivable from `peers_features` (in the peer's order) is used, and without any
/// authorization feature the local default `my_preferred[0]`.
///
/// # Panics
/// If `my_preferred` is empty.
pub fn select_authorization_token_type(
    my_preferred: &[AuthorizationTokenType],
    peers_features: &[Feature],
) -> AuthorizationTokenType {
    assert!(!my_preferred.is_empty(), "my_preferred must not be empty");
    let default = my_preferred[0];
    if peers_features.is_empty() {
        return default;
    }
    if let Some(t) = my_preferred.iter().copied().find(|t| peers_features.contains(&t.feature())) {
        return t;
    }
    peers_features
        .iter()
        .copied()
        .find_map(AuthorizationTokenType::from_feature)
        .unwrap_or(default)
}

/// Authorization errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(AuthorizationTokenType),
}

/// Token stamped on an authorized message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AuthorizationToken {
    /// Hash-cash proof.
    HashCash(HashCashToken),
    /// Equihash proof (opaque; this node cannot check it).
    EquiHash {
        /// Encoded solution.
        solution: Vec<u8>,
        /// Per-connection message counter.
        message_counter: i32,
    },
}

impl AuthorizationToken {
    /// Scheme of this token.
    pub fn token_type(&self) -> AuthorizationTokenType {
        match self {
            AuthorizationToken::HashCash(_) => AuthorizationTokenType::HashCash,
            AuthorizationToken::EquiHash { .. } => AuthorizationTokenType::EquiHash,
        }
    }
}

/// Negotiates token schemes and mints/checks tokens.
#[derive(Debug)]
pub struct AuthorizationService {
    preferred: Vec<AuthorizationTokenType>,
    hash_cash: HashCashTokenService,
}

impl AuthorizationService {
    /// Service preferring `preferred` in order.
    ///
    /// # Panics
    /// If `preferred` is empty.
    pub fn new(preferred: Vec<AuthorizationTokenType>) -> Self {
        assert!(!preferred.is_empty(), "preferred token types must not be empty");
        Self { preferred, hash_cash: HashCashTokenService::new() }
    }

    /// Local preference order.
    pub fn preferred(&self) -> &[AuthorizationTokenType] {
        &self.preferred
    }

    /// Scheme to use with a peer advertising `peers_features`.
    pub fn select_token_type(&self, peers_features: &[Feature]) -> AuthorizationTokenType {
        let t = select_authorization_token_type(&self.preferred, peers_features);
        debug!(token_type = %t, "authorization token type selected");
        t
    }

    /// Mint a token of `token_type` for a message to `peer_address`.
    pub fn create_token(
        &self,
        token_type: AuthorizationTokenType,
        payload: AuthorizedPayload<'_>,
        peer_load: f64,
        peer_address: &str,
        message_counter: i32,
    ) -> Result<AuthorizationToken, AuthorizationError> {
        match token_type {
            AuthorizationTokenType::HashCash => Ok(AuthorizationToken::HashCash(
                self.hash_cash.create_token(payload, peer_load, peer_address, message_counter),
            )),
            AuthorizationTokenType::EquiHash => Err(AuthorizationError::UnsupportedTokenType(token_type)),
        }
    }

    /// Check a token received on `connection_id`, addressed to `my_address`.
    pub fn is_authorized(
        &self,
        payload: AuthorizedPayload<'_>,
        token: &AuthorizationToken,
        load: NetworkLoad,
        connection_id: &str,
        my_address: &str,
    ) -> bool {
        match token {
            AuthorizationToken::HashCash(t) => {
                self.hash_cash.is_authorized(payload, t, load, connection_id, my_address)
            }
            AuthorizationToken::EquiHash { .. } => {
                warn!(connection = %connection_id, "equihash tokens are not supported");
                false
            }
        }
    }

    /// Forget per-connection state of a closed connection.
    pub fn on_disconnect(&self, connection_id: &str) {
        self.hash_cash.on_disconnect(connection_id);
    }
}
