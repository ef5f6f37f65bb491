//! Sealed relay tokens.
//!
//! A relay proves possession of its private key at init by sealing a random
//! token to the backend. The box key is derived from the static-static X25519
//! exchange between the two parties, so only the holder of either private key
//! can produce or open it:
//!
//! ```text
//! key   = BLAKE3-KDF("relaynet sealed box v1", X25519(relay_sk, backend_pk))
//! box   = XChaCha20-Poly1305(key, nonce, token)
//! ```
//!
//! Opening fails closed: any mismatch in keys, nonce or ciphertext is reported
//! as [`CryptoError::DecryptionFailed`].

use crate::hash::Kdf;
use crate::x25519::{PrivateKey, PublicKey};
use crate::{CryptoError, RELAY_TOKEN_SIZE, SEALED_TOKEN_SIZE, TAG_SIZE, XCHACHA_NONCE_SIZE};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

const SEALED_BOX_CONTEXT: &str = "relaynet sealed box v1";

/// XChaCha20-Poly1305 nonce (24 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Nonce([u8; XCHACHA_NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; XCHACHA_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a random nonce.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; XCHACHA_NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; XCHACHA_NONCE_SIZE] {
        &self.0
    }
}

/// Generate a random relay token.
#[must_use]
pub fn generate_token<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; RELAY_TOKEN_SIZE] {
    let mut token = [0u8; RELAY_TOKEN_SIZE];
    rng.fill_bytes(&mut token);
    token
}

fn box_cipher(
    local_private: &PrivateKey,
    peer_public: &PublicKey,
) -> Result<XChaCha20Poly1305, CryptoError> {
    let shared = local_private
        .exchange(peer_public)
        .ok_or(CryptoError::LowOrderPoint)?;
    let key = Zeroizing::new(Kdf::new(SEALED_BOX_CONTEXT).derive_key(shared.as_bytes()));
    Ok(XChaCha20Poly1305::new((&*key).into()))
}

/// Seal `plaintext` from the holder of `sender_private` to `receiver_public`.
///
/// Returns ciphertext with the 16-byte tag appended.
///
/// # Errors
///
/// Returns [`CryptoError::LowOrderPoint`] for a degenerate receiver key and
/// [`CryptoError::EncryptionFailed`] if the AEAD rejects the input.
pub fn seal(
    plaintext: &[u8],
    nonce: &Nonce,
    sender_private: &PrivateKey,
    receiver_public: &PublicKey,
) -> Result<Vec<u8>, CryptoError> {
    box_cipher(sender_private, receiver_public)?
        .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Open a box sealed by the holder of the private key behind `sender_public`.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] if the box does not authenticate
/// under this key pair and nonce, and [`CryptoError::LowOrderPoint`] for a
/// degenerate sender key.
pub fn open(
    ciphertext: &[u8],
    nonce: &Nonce,
    sender_public: &PublicKey,
    receiver_private: &PrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    box_cipher(receiver_private, sender_public)?
        .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Seal a relay token into its fixed-size wire form.
///
/// # Errors
///
/// See [`seal`].
pub fn seal_token(
    token: &[u8; RELAY_TOKEN_SIZE],
    nonce: &Nonce,
    relay_private: &PrivateKey,
    backend_public: &PublicKey,
) -> Result<[u8; SEALED_TOKEN_SIZE], CryptoError> {
    let sealed = seal(token, nonce, relay_private, backend_public)?;
    sealed
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Open a fixed-size sealed relay token.
///
/// # Errors
///
/// See [`open`].
pub fn open_token(
    sealed: &[u8; SEALED_TOKEN_SIZE],
    nonce: &Nonce,
    relay_public: &PublicKey,
    backend_private: &PrivateKey,
) -> Result<[u8; RELAY_TOKEN_SIZE], CryptoError> {
    let token = Zeroizing::new(open(sealed, nonce, relay_public, backend_private)?);
    token
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)
}
