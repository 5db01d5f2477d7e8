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

//! Hash-cash proof of work used to authorize messages on a connection.
//!
//! The difficulty scales with the message's cost factor and the receiver's network load. The
//! challenge binds a proof to the receiving peer's address and a per-connection message
//! counter; a counter is accepted only once per connection.

use crate::core::types::sha256;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

/// Lower bound of the cost factor entering the difficulty.
pub const MIN_MESSAGE_COST: f64 = 0.01;
/// Lower bound of the load entering the difficulty.
pub const MIN_LOAD: f64 = 0.01;
/// Easiest accepted difficulty (2^7).
pub const MIN_DIFFICULTY: f64 = 128.0;
/// Hardest difficulty (2^16).
pub const MAX_DIFFICULTY: f64 = 65_536.0;
/// How far below the expected difficulty a proof may fall and still be accepted.
pub const DIFFICULTY_TOLERANCE: f64 = 50_000.0;

/// Difficulty for a message of `cost_factor` sent to a peer reporting `load`.
pub fn calculate_difficulty(cost_factor: f64, load: f64) -> f64 {
    let cost = cost_factor.clamp(MIN_MESSAGE_COST, 1.0);
    let load = load.clamp(MIN_LOAD, 1.0);
    (MAX_DIFFICULTY * cost + MAX_DIFFICULTY * load).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Challenge bound to the receiver's address and the message counter.
pub fn challenge(peer_address: &str, message_counter: i32) -> [u8; 32] {
    let mut buf = Vec::with_capacity(peer_address.len() + 4);
    buf.extend_from_slice(peer_address.as_bytes());
    buf.extend_from_slice(&message_counter.to_be_bytes());
    sha256(&buf)
}

/// Leading zero bits a hash must have to meet `difficulty`.
pub fn required_zero_bits(difficulty: f64) -> u32 {
    if difficulty <= 1.0 {
        return 0;
    }
    difficulty.log2().ceil() as u32
}

fn leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut bits = 0;
    for b in hash {
        if *b == 0 {
            bits += 8;
        } else {
            bits += b.leading_zeros();
            break;
        }
    }
    bits
}

fn pow_hash(payload: &[u8], challenge: &[u8; 32], counter: u64) -> [u8; 32] {
    let mut buf = Vec::with_capacity(payload.len() + 32 + 8);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(challenge);
    buf.extend_from_slice(&counter.to_be_bytes());
    sha256(&buf)
}

/// A solved hash-cash puzzle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofOfWork {
    /// Bytes the work was done over.
    pub payload: Vec<u8>,
    /// Receiver-bound challenge.
    pub challenge: [u8; 32],
    /// Difficulty the minter claimed.
    pub difficulty: f64,
    /// Solution counter.
    pub counter: u64,
}

impl ProofOfWork {
    /// Search for a counter meeting `difficulty`.
    pub fn mint(payload: &[u8], challenge: [u8; 32], difficulty: f64) -> Self {
        let bits = required_zero_bits(difficulty);
        let mut counter = 0u64;
        while leading_zero_bits(&pow_hash(payload, &challenge, counter)) < bits {
            counter += 1;
        }
        Self { payload: payload.to_vec(), challenge, difficulty, counter }
    }

    /// True if the solution meets the claimed difficulty.
    pub fn verify(&self) -> bool {
        leading_zero_bits(&pow_hash(&self.payload, &self.challenge, self.counter))
            >= required_zero_bits(self.difficulty)
    }
}

/// Hash-cash authorization token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HashCashToken {
    /// The proof.
    pub proof_of_work: ProofOfWork,
    /// Per-connection message counter the challenge was derived from.
    pub message_counter: i32,
}

/// Network load reported by this node, now and at the previous exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkLoad {
    /// Current load in `[0, 1]`.
    pub current: f64,
    /// Load of the previous exchange, if one happened.
    pub previous: Option<f64>,
}

impl NetworkLoad {
    /// Load without history.
    pub fn current(load: f64) -> Self {
        Self { current: load, previous: None }
    }
}

/// Message bytes and cost factor a token is minted for.
#[derive(Clone, Copy, Debug)]
pub struct AuthorizedPayload<'a> {
    /// Canonical bytes of the message.
    pub bytes: &'a [u8],
    /// Message cost factor.
    pub cost_factor: f64,
}

/// Mints and checks hash-cash tokens and remembers used message counters per connection.
#[derive(Debug, Default)]
pub struct HashCashTokenService {
    received_counters: Mutex<HashMap<String, HashSet<i32>>>,
}

impl HashCashTokenService {
    /// New service without history.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, HashSet<i32>>> {
        match self.received_counters.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Mint a token for a message to `peer_address`, which reported `peer_load`.
    pub fn create_token(
        &self,
        payload: AuthorizedPayload<'_>,
        peer_load: f64,
        peer_address: &str,
        message_counter: i32,
    ) -> HashCashToken {
        let difficulty = calculate_difficulty(payload.cost_factor, peer_load);
        let proof_of_work =
            ProofOfWork::mint(payload.bytes, challenge(peer_address, message_counter), difficulty);
        debug!(difficulty, message_counter, "hash-cash token minted");
        HashCashToken { proof_of_work, message_counter }
    }

    /// Check a token received on `connection_id`, addressed to `my_address`.
    pub fn is_authorized(
        &self,
        payload: AuthorizedPayload<'_>,
        token: &HashCashToken,
        load: NetworkLoad,
        connection_id: &str,
        my_address: &str,
    ) -> bool {
        if !self.counters().entry(connection_id.to_string()).or_default().insert(token.message_counter) {
            warn!(connection = %connection_id, counter = token.message_counter, "proof of work reused");
            return false;
        }
        let pow = &token.proof_of_work;
        if pow.payload != payload.bytes {
            warn!(connection = %connection_id, "message does not match proof of work payload");
            return false;
        }
        if pow.challenge != challenge(my_address, token.message_counter) {
            warn!(connection = %connection_id, "invalid challenge");
            return false;
        }
        if !difficulty_acceptable(payload.cost_factor, pow.difficulty, load) {
            return false;
        }
        pow.verify()
    }

    /// Forget counters of a closed connection.
    pub fn on_disconnect(&self, connection_id: &str) {
        self.counters().remove(connection_id);
    }
}

fn difficulty_acceptable(cost_factor: f64, difficulty: f64, load: NetworkLoad) -> bool {
    let expected = calculate_difficulty(cost_factor, load.current);
    if difficulty >= expected {
        return true;
    }
    let missing = expected - difficulty;
    if missing <= DIFFICULTY_TOLERANCE {
        info!(expected, difficulty, "difficulty below current load expectation but tolerated");
        return true;
    }
    if let Some(previous) = load.previous {
        let expected_previous = calculate_difficulty(cost_factor, previous);
        if difficulty >= expected_previous || expected_previous - difficulty <= DIFFICULTY_TOLERANCE {
            debug!(expected_previous, difficulty, "difficulty matches previous load");
            return true;
        }
    }
    warn!(expected, difficulty, "difficulty outside tolerated range");
    false
}
