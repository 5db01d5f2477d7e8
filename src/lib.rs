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

//! meshdata - replicated data layer for peer-to-peer nodes.
//!
//! This crate provides:
//! - Per-category authenticated, mailbox and append-only stores with TTL, capacity bounds and
//!   per-owner replay protection, persisted with sled
//! - A lazily populated store registry shared by all inbound-message handlers
//! - Authorization token negotiation with hash-cash proof of work
//! - A Ping/Pong keep-alive protocol with timeout and disconnect cancellation
//! - Monitoring via Prometheus metrics and structured logging

/// Value types, configuration and ownership proofs.
pub mod core;
/// Observability (metrics and their HTTP exporter).
pub mod monitoring;
/// Peer-facing protocols (keep-alive, authorization).
pub mod networking;
/// Replicated data storage.
pub mod storage;
