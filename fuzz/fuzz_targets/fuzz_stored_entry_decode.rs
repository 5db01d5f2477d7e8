// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use meshdata::core::types::decode_canonical_limited;
use meshdata::storage::record::{OwnerSequence, StoredEntry};

fuzz_target!(|data: &[u8]| {
    // Persisted values come back from disk; decoding must never panic.
    let _ = decode_canonical_limited::<StoredEntry>(data, 4 * 1024 * 1024);
    let _ = decode_canonical_limited::<OwnerSequence>(data, 64);
});
