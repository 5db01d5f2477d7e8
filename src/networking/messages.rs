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

//! Keep-alive wire messages.

use crate::core::types::{decode_canonical_limited, encode_canonical, CodecError};
use serde::{Deserialize, Serialize};

/// Upper bound of an encoded keep-alive message.
pub const MAX_KEEP_ALIVE_MESSAGE_BYTES: usize = 64;

/// Liveness probe. The nonce is only used to match the answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ping {
    /// Random per-probe value.
    pub nonce: i32,
}

/// Answer to a [`Ping`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pong {
    /// Nonce of the ping being answered.
    pub request_nonce: i32,
}

/// Keep-alive protocol message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeepAliveMessage {
    /// Probe.
    Ping(Ping),
    /// Answer.
    Pong(Pong),
}

impl KeepAliveMessage {
    /// Canonical bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode_canonical(self)
    }

    /// Decode canonical bytes, rejecting oversize input and trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_canonical_limited(bytes, MAX_KEEP_ALIVE_MESSAGE_BYTES)
    }
}

impl From<Ping> for KeepAliveMessage {
    fn from(p: Ping) -> Self {
        KeepAliveMessage::Ping(p)
    }
}

impl From<Pong> for KeepAliveMessage {
    fn from(p: Pong) -> Self {
        KeepAliveMessage::Pong(p)
    }
}
