//! # relaynet Crypto
//!
//! Cryptographic primitives for the relaynet control plane.
//!
//! This crate provides:
//! - Sealed relay tokens proving possession of a relay's private key at init
//! - Ed25519 detached signatures over server and session packets
//! - Deterministic 64-bit identifiers derived from addresses and names
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 | 128-bit |
//! | Sealed Token | X25519 + BLAKE3 KDF + XChaCha20-Poly1305 | 256-bit key |
//! | Signatures | Ed25519 | 128-bit |
//! | Identifiers | FNV-1a 64 | not collision resistant |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod sealed_box;
pub mod signatures;
pub mod x25519;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size
pub const X25519_SECRET_KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size
pub const TAG_SIZE: usize = 16;

/// Plaintext relay token size
pub const RELAY_TOKEN_SIZE: usize = 32;

/// Sealed relay token size (token plus tag)
pub const SEALED_TOKEN_SIZE: usize = RELAY_TOKEN_SIZE + TAG_SIZE;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 secret key size
pub const ED25519_SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;
