//! Versioned wire packets.
//!
//! Every packet kind has a maximum supported version. Decoding a higher
//! version fails before any other field is read, and encoding one fails too,
//! so the codec never produces bytes it could not parse back.

pub mod relay;
pub mod server;

use crate::error::PacketError;
use relaynet_crypto::signatures::{SigningKey, verify_detached};
use relaynet_crypto::{CryptoError, ED25519_SIGNATURE_SIZE};

/// A versioned wire packet.
pub trait Packet: Sized {
    /// Human readable packet kind used in errors and logs.
    const KIND: &'static str;

    /// Highest version this codec can decode and encode.
    const MAX_VERSION: u32;

    /// Decode from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] naming the first field that failed.
    fn decode(data: &[u8]) -> Result<Self, PacketError>;

    /// Encode to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] if the packet violates a bound the decoder
    /// would enforce.
    fn encode(&self) -> Result<Vec<u8>, PacketError>;
}

/// A packet whose final field is an Ed25519 signature over every preceding
/// field.
pub trait SignedPacket: Packet {
    /// Current signature bytes.
    fn signature(&self) -> &[u8; ED25519_SIGNATURE_SIZE];

    /// Replace the signature bytes.
    fn set_signature(&mut self, signature: [u8; ED25519_SIGNATURE_SIZE]);

    /// Bytes the signature covers: the encoding minus the trailing signature.
    ///
    /// # Errors
    ///
    /// Propagates encode errors.
    fn sign_data(&self) -> Result<Vec<u8>, PacketError> {
        let mut bytes = self.encode()?;
        bytes.truncate(bytes.len() - ED25519_SIGNATURE_SIZE);
        Ok(bytes)
    }

    /// Sign the packet in place.
    ///
    /// # Errors
    ///
    /// Propagates encode errors.
    fn sign(&mut self, key: &SigningKey) -> Result<(), PacketError> {
        let signature = key.sign(&self.sign_data()?);
        self.set_signature(signature.to_bytes());
        Ok(())
    }

    /// Verify the packet signature against a raw Ed25519 public key.
    ///
    /// A packet that cannot be re-encoded does not verify.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] or
    /// [`CryptoError::InvalidPublicKey`].
    fn verify(&self, public_key: &[u8; 32]) -> Result<(), CryptoError> {
        let data = self
            .sign_data()
            .map_err(|_| CryptoError::InvalidSignature)?;
        verify_detached(public_key, &data, self.signature())
    }
}
