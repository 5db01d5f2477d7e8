// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use meshdata::networking::messages::KeepAliveMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = KeepAliveMessage::decode(data) {
        // Whatever decodes must encode back to the same bytes.
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.as_slice(), data);
    }
});
