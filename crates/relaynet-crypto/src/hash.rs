//! Identifier hashing and key derivation.
//!
//! Provides:
//! - FNV-1a 64-bit hashing for relay and datacenter identifiers
//! - Context-specific BLAKE3 KDF

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Compute the FNV-1a 64-bit hash of `data`.
#[must_use]
pub fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Relay ID for a textual `ip:port` address.
///
/// Identical addresses always map to the same ID, so the ID can be recomputed
/// from the address a relay reports without any lookup.
#[must_use]
pub fn relay_id(address: &str) -> u64 {
    fnv1a_64(address.as_bytes())
}

/// Datacenter ID for a datacenter name.
#[must_use]
pub fn datacenter_id(name: &str) -> u64 {
    fnv1a_64(name.as_bytes())
}

/// BLAKE3 Key Derivation Function with context.
pub struct Kdf {
    context: &'static str,
}

impl Kdf {
    /// Create a KDF with a specific context string.
    #[must_use]
    pub fn new(context: &'static str) -> Self {
        Self { context }
    }

    /// Derive a 32-byte key.
    #[must_use]
    pub fn derive_key(&self, ikm: &[u8]) -> [u8; 32] {
        blake3::derive_key(self.context, ikm)
    }
}
