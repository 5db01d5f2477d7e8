// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use meshdata::networking::authorization::{
    select_authorization_token_type, AuthorizationTokenType, Feature,
};

#[derive(Arbitrary, Debug)]
struct Input {
    preferred: Vec<bool>,
    features: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let preferred: Vec<AuthorizationTokenType> = input
        .preferred
        .iter()
        .map(|h| if *h { AuthorizationTokenType::HashCash } else { AuthorizationTokenType::EquiHash })
        .collect();
    if preferred.is_empty() {
        return;
    }
    let features: Vec<Feature> = input
        .features
        .iter()
        .map(|b| match b % 4 {
            0 => Feature::AuthorizationHashCash,
            1 => Feature::AuthorizationEquiHash,
            2 => Feature::InventoryHashSetFilter,
            _ => Feature::InventoryMinerFilter,
        })
        .collect();

    let selected = select_authorization_token_type(&preferred, &features);
    let advertised = features.iter().any(|f| AuthorizationTokenType::from_feature(*f).is_some());
    // Never pick a scheme the peer cannot speak when it advertises at least one.
    if advertised {
        assert!(features.contains(&selected.feature()));
    } else {
        assert_eq!(selected, preferred[0]);
    }
});
