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

use meshdata::networking::authorization::{
    select_authorization_token_type, AuthorizationError, AuthorizationService, AuthorizationToken,
    AuthorizationTokenType::{EquiHash, HashCash},
    Feature,
};
use meshdata::networking::hash_cash::{
    calculate_difficulty, challenge, AuthorizedPayload, HashCashTokenService, NetworkLoad, ProofOfWork,
    MAX_DIFFICULTY,
};

#[test]
fn test_select_without_peer_features_uses_my_first() {
    assert_eq!(select_authorization_token_type(&[HashCash], &[]), HashCash);
    assert_eq!(select_authorization_token_type(&[EquiHash, HashCash], &[]), EquiHash);
}

#[test]
fn test_select_prefers_my_order() {
    assert_eq!(
        select_authorization_token_type(&[HashCash, EquiHash], &[Feature::AuthorizationEquiHash]),
        EquiHash
    );
    assert_eq!(
        select_authorization_token_type(
            &[HashCash, EquiHash],
            &[Feature::AuthorizationEquiHash, Feature::AuthorizationHashCash]
        ),
        HashCash
    );
    assert_eq!(
        select_authorization_token_type(
            &[EquiHash, HashCash],
            &[Feature::AuthorizationHashCash, Feature::AuthorizationEquiHash]
        ),
        EquiHash
    );
}

#[test]
fn test_select_falls_back_to_peer_scheme() {
    assert_eq!(
        select_authorization_token_type(
            &[HashCash],
            &[Feature::InventoryHashSetFilter, Feature::AuthorizationEquiHash]
        ),
        EquiHash
    );
    assert_eq!(
        select_authorization_token_type(&[EquiHash], &[Feature::InventoryMinerFilter]),
        EquiHash
    );
}

#[test]
#[should_panic]
fn test_select_with_empty_preference_panics() {
    let _ = select_authorization_token_type(&[], &[Feature::AuthorizationHashCash]);
}

#[test]
fn test_token_type_parses_from_toml_names() {
    #[derive(serde::Deserialize)]
    struct Doc {
        preferred: Vec<meshdata::networking::authorization::AuthorizationTokenType>,
    }
    let doc: Doc = toml::from_str(r#"preferred = ["equi_hash", "hash_cash"]"#).unwrap();
    assert_eq!(doc.preferred, vec![EquiHash, HashCash]);
}

#[test]
fn test_difficulty_bounds() {
    assert_eq!(calculate_difficulty(1.0, 1.0), MAX_DIFFICULTY);
    assert_eq!(calculate_difficulty(5.0, 3.0), MAX_DIFFICULTY);
    let low = calculate_difficulty(0.0, 0.0);
    assert!((low - MAX_DIFFICULTY * 0.02).abs() < 1e-6);
}

#[test]
fn test_mint_and_verify() {
    let pow = ProofOfWork::mint(b"payload", challenge("peer.onion:9999", 1), 2_000.0);
    assert!(pow.verify());

    let mut harder = pow.clone();
    harder.difficulty = MAX_DIFFICULTY * 1_000_000.0;
    assert!(!harder.verify());
}

#[test]
fn test_hash_cash_token_roundtrip_and_reuse() {
    let minter = HashCashTokenService::new();
    let verifier = HashCashTokenService::new();
    let payload = AuthorizedPayload { bytes: b"add-data", cost_factor: 0.01 };

    let token = minter.create_token(payload, 0.01, "me.onion:1000", 7);
    assert!(verifier.is_authorized(payload, &token, NetworkLoad::current(0.01), "conn-1", "me.onion:1000"));
    assert!(!verifier.is_authorized(payload, &token, NetworkLoad::current(0.01), "conn-1", "me.onion:1000"));

    // Counters are per connection.
    assert!(verifier.is_authorized(payload, &token, NetworkLoad::current(0.01), "conn-2", "me.onion:1000"));

    verifier.on_disconnect("conn-1");
    assert!(verifier.is_authorized(payload, &token, NetworkLoad::current(0.01), "conn-1", "me.onion:1000"));
}

#[test]
fn test_hash_cash_rejects_wrong_binding() {
    let svc = HashCashTokenService::new();
    let payload = AuthorizedPayload { bytes: b"add-data", cost_factor: 0.01 };
    let token = svc.create_token(payload, 0.01, "me.onion:1000", 1);

    let other_payload = AuthorizedPayload { bytes: b"something else", cost_factor: 0.01 };
    assert!(!svc.is_authorized(other_payload, &token, NetworkLoad::current(0.01), "c1", "me.onion:1000"));
    assert!(!svc.is_authorized(payload, &token, NetworkLoad::current(0.01), "c2", "someone.onion:1000"));
}

#[test]
fn test_hash_cash_difficulty_tolerance() {
    let svc = HashCashTokenService::new();
    let payload = AuthorizedPayload { bytes: b"cheap", cost_factor: 0.01 };

    // Minted against load 0.01 (~1311), expected 65536 at full load: outside the tolerance.
    let token = svc.create_token(payload, 0.01, "me:1", 1);
    assert!(!svc.is_authorized(payload, &token, NetworkLoad::current(1.0), "c1", "me:1"));

    // The previous load still matches.
    let token = svc.create_token(payload, 0.01, "me:1", 2);
    let load = NetworkLoad { current: 1.0, previous: Some(0.01) };
    assert!(svc.is_authorized(payload, &token, load, "c1", "me:1"));

    // Inside the tolerance of the current load.
    let token = svc.create_token(payload, 0.5, "me:1", 3);
    assert!(svc.is_authorized(payload, &token, NetworkLoad::current(1.0), "c1", "me:1"));
}

#[test]
fn test_service_dispatch() {
    let svc = AuthorizationService::new(vec![HashCash, EquiHash]);
    assert_eq!(svc.select_token_type(&[Feature::AuthorizationEquiHash]), EquiHash);

    let payload = AuthorizedPayload { bytes: b"msg", cost_factor: 0.01 };
    assert_eq!(
        svc.create_token(EquiHash, payload, 0.01, "peer:1", 1),
        Err(AuthorizationError::UnsupportedTokenType(EquiHash))
    );

    let token = svc.create_token(HashCash, payload, 0.01, "me:1", 1).unwrap();
    assert_eq!(token.token_type(), HashCash);
    assert!(svc.is_authorized(payload, &token, NetworkLoad::current(0.01), "c", "me:1"));

    let equi = AuthorizationToken::EquiHash { solution: vec![1, 2, 3], message_counter: 2 };
    assert!(!svc.is_authorized(payload, &equi, NetworkLoad::current(0.01), "c", "me:1"));
}
