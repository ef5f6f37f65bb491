//! Fuzz target for sealed relay token opening
//!
//! Opening attacker-controlled ciphertext under arbitrary keys must fail
//! cleanly.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use relaynet_crypto::sealed_box::{Nonce, open, open_token};
use relaynet_crypto::x25519::{PrivateKey, PublicKey};

#[derive(Debug, Arbitrary)]
struct SealedInput {
    nonce: [u8; 24],
    relay_public: [u8; 32],
    backend_private: [u8; 32],
    sealed: [u8; 48],
    tail: Vec<u8>,
}

fuzz_target!(|input: SealedInput| {
    let nonce = Nonce::from_bytes(input.nonce);
    let relay_public = PublicKey::from_bytes(input.relay_public);
    let backend_private = PrivateKey::from_bytes(input.backend_private);

    let _ = open_token(&input.sealed, &nonce, &relay_public, &backend_private);
    let _ = open(&input.tail, &nonce, &relay_public, &backend_private);
});
