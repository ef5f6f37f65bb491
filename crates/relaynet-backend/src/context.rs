//! Shared handler context.

use crate::config::BackendConfig;
use crate::directory::RelayDirectory;
use crate::stats::StatsDatabase;
use crate::store::EphemeralStore;
use crate::storer::Storer;
use rand_core::{CryptoRng, RngCore};
use relaynet_crypto::signatures::SigningKey;
use relaynet_crypto::x25519::{PrivateKey, PublicKey};
use std::sync::Arc;

/// Long-term backend key material
pub struct BackendKeys {
    /// X25519 key relays seal their init token to
    pub relay_private: PrivateKey,
    /// Ed25519 key signing server and session responses
    pub signing: SigningKey,
}

impl BackendKeys {
    /// Wrap existing keys.
    pub fn new(relay_private: PrivateKey, signing: SigningKey) -> Self {
        Self {
            relay_private,
            signing,
        }
    }

    /// Fresh random keys.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            relay_private: PrivateKey::generate(rng),
            signing: SigningKey::generate(rng),
        }
    }

    /// Public half of the relay key.
    #[must_use]
    pub fn relay_public(&self) -> PublicKey {
        self.relay_private.public_key()
    }

    /// Public half of the signing key.
    #[must_use]
    pub fn signing_public(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for BackendKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKeys")
            .field("relay_public", &hex::encode(self.relay_public().as_bytes()))
            .field("signing_public", &hex::encode(self.signing_public()))
            .finish()
    }
}

/// Everything a handler needs, cheap to clone into each task
#[derive(Clone, Debug)]
pub struct BackendContext {
    /// Two-tier relay directory
    pub directory: Arc<RelayDirectory>,
    /// Ping relation graph
    pub stats: Arc<StatsDatabase>,
    /// Backend keys
    pub keys: Arc<BackendKeys>,
    /// Tuning
    pub config: Arc<BackendConfig>,
}

impl BackendContext {
    /// Build a context over the given tiers.
    pub fn new(
        storer: Arc<dyn Storer>,
        store: Arc<dyn EphemeralStore>,
        keys: BackendKeys,
        config: BackendConfig,
    ) -> Self {
        let directory = RelayDirectory::new(storer, store, config.store_timeout);
        Self {
            directory: Arc::new(directory),
            stats: Arc::new(StatsDatabase::new()),
            keys: Arc::new(keys),
            config: Arc::new(config),
        }
    }
}
