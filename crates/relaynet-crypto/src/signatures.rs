//! Ed25519 detached signatures for server and session packets.
//!
//! Game servers and client SDKs sign the "sign data" of each packet (every
//! field before the signature) with their customer key; the backend signs
//! its responses with its own key.
//!
//! ```ignore
//! use relaynet_crypto::signatures::SigningKey;
//! use rand_core::OsRng;
//!
//! let signing_key = SigningKey::generate(&mut OsRng);
//! let signature = signing_key.sign(b"sign data");
//! assert!(signing_key.verifying_key().verify(b"sign data", &signature).is_ok());
//! ```

use crate::{CryptoError, ED25519_SIGNATURE_SIZE};
use ed25519_dalek::{Signer, Verifier};
use rand_core::{CryptoRng, RngCore};
use zeroize::ZeroizeOnDrop;

/// Ed25519 signature (64 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature([u8; ED25519_SIGNATURE_SIZE]);

impl Signature {
    /// Create a signature from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; ED25519_SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the slice is not exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; ED25519_SIGNATURE_SIZE] = slice
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(bytes))
    }

    /// Get the raw signature bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ED25519_SIGNATURE_SIZE] {
        &self.0
    }

    /// Consume into raw bytes
    #[must_use]
    pub fn to_bytes(self) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.0
    }

    fn to_dalek(self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

/// Ed25519 signing key (private key)
///
/// Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a new random signing key
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Create from raw 32-byte seed
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Create from a 32-byte seed slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: slice.len(),
        })?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Sign a message. Signing is deterministic.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.inner.sign(message).to_bytes())
    }

    /// Get the corresponding verifying key (public key)
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Export signing key seed bytes
    ///
    /// # Security
    ///
    /// This exposes the raw secret key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 verifying key (public key)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerifyingKey {
    /// Create from raw 32-byte public key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes do not
    /// represent a valid Ed25519 public key point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// Get the raw public key bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Verify a signature on a message
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature does not
    /// authenticate the message under this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        self.inner
            .verify(message, &signature.to_dalek())
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Verify `signature` over `message` with a raw 32-byte public key.
///
/// Fails closed: an undecodable key is reported as
/// [`CryptoError::InvalidPublicKey`].
///
/// # Errors
///
/// See [`VerifyingKey::from_bytes`] and [`VerifyingKey::verify`].
pub fn verify_detached(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; ED25519_SIGNATURE_SIZE],
) -> Result<(), CryptoError> {
    VerifyingKey::from_bytes(public_key)?.verify(message, &Signature::from_bytes(*signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_sign_verify_roundtrip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let signature = signing_key.sign(b"server update");

        assert!(
            signing_key
                .verifying_key()
                .verify(b"server update", &signature)
                .is_ok()
        );
    }

    #[test]
    fn test_wrong_message_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let signature = signing_key.sign(b"original");

        assert_eq!(
            signing_key.verifying_key().verify(b"tampered", &signature),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let signature = signer.sign(b"test");

        assert!(
            verify_detached(&other.verifying_key().to_bytes(), b"test", signature.as_bytes())
                .is_err()
        );
    }

    #[test]
    fn test_signature_deterministic() {
        let signing_key = SigningKey::generate(&mut OsRng);
        assert_eq!(signing_key.sign(b"same"), signing_key.sign(b"same"));
    }

    #[test]
    fn test_seed_roundtrip() {
        let original = SigningKey::generate(&mut OsRng);
        let restored = SigningKey::from_slice(&original.to_bytes()).unwrap();
        assert_eq!(original.verifying_key(), restored.verifying_key());
    }

    #[test]
    fn test_signature_from_slice_wrong_length() {
        assert_eq!(
            Signature::from_slice(&[0u8; 63]),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_detached_accepts_valid() {
        let signer = SigningKey::generate(&mut OsRng);
        let signature = signer.sign(b"payload");
        assert!(
            verify_detached(&signer.verifying_key().to_bytes(), b"payload", signature.as_bytes())
                .is_ok()
        );
    }
}
