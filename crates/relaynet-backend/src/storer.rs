//! Durable directory tier.
//!
//! Relay identity, keys, datacenters and buyers change rarely and are owned
//! by an external operator-managed store. The backend only reads them, except
//! for the relay `state` field which the lifecycle writes back.

use crate::error::StoreError;
use crate::state::RelayState;
use async_trait::async_trait;
use dashmap::DashMap;
use relaynet_core::MAX_RELAY_ID_LENGTH;
use relaynet_crypto::hash::{datacenter_id, relay_id};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Physical location hosting relays or game servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datacenter {
    /// FNV-1a hash of `name`
    #[serde(default)]
    pub id: u64,
    /// Datacenter name, e.g. `"linode.fremont"`
    pub name: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Datacenter {
    /// Datacenter with its ID derived from `name`.
    #[must_use]
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id: datacenter_id(name),
            name: name.to_string(),
            latitude,
            longitude,
        }
    }
}

/// Hosting provider selling relay capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    /// Seller identifier
    pub id: String,
    /// Display name, shared by relays on the same private network
    pub name: String,
    /// Egress price per GB in cents
    #[serde(default)]
    pub egress_price_cents: u64,
}

/// Durable relay record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    /// FNV-1a hash of `address`
    #[serde(default)]
    pub id: u64,
    /// Operator-assigned name
    pub name: String,
    /// Public UDP endpoint
    pub address: SocketAddr,
    /// Endpoint on the seller's private network, if any
    #[serde(default)]
    pub internal_address: Option<SocketAddr>,
    /// X25519 public key the relay seals its init token with
    #[serde(with = "serde_hex")]
    pub public_key: [u8; 32],
    /// Hosting datacenter
    pub datacenter: Datacenter,
    /// Hosting seller
    pub seller: Seller,
    /// Session capacity
    #[serde(default)]
    pub max_sessions: u32,
    /// Lifecycle state
    #[serde(default = "default_relay_state")]
    pub state: RelayState,
}

fn default_relay_state() -> RelayState {
    RelayState::Offline
}

impl Relay {
    /// Offline relay with its ID derived from `address`.
    #[must_use]
    pub fn new(
        name: &str,
        address: SocketAddr,
        public_key: [u8; 32],
        datacenter: Datacenter,
        seller: Seller,
    ) -> Self {
        Self {
            id: relay_id(&address.to_string()),
            name: name.to_string(),
            address,
            internal_address: None,
            public_key,
            datacenter,
            seller,
            max_sessions: 0,
            state: RelayState::Offline,
        }
    }
}

/// Game developer account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    /// Customer ID carried in server and session packets
    pub id: u64,
    /// Display name
    pub name: String,
    /// Ed25519 key verifying server and session packets
    #[serde(with = "serde_hex")]
    pub public_key: [u8; 32],
    /// Production account
    #[serde(default)]
    pub live: bool,
}

/// Read access to the durable directory, plus relay state write-back.
#[async_trait]
pub trait Storer: Send + Sync {
    /// Relay by ID.
    async fn relay(&self, id: u64) -> Result<Relay, StoreError>;

    /// Overwrite a relay record.
    async fn set_relay(&self, relay: &Relay) -> Result<(), StoreError>;

    /// Every known relay.
    async fn relays(&self) -> Result<Vec<Relay>, StoreError>;

    /// Buyer by customer ID.
    async fn buyer(&self, id: u64) -> Result<Buyer, StoreError>;

    /// Datacenter by ID.
    async fn datacenter(&self, id: u64) -> Result<Datacenter, StoreError>;
}

/// Contents of a JSON seed document
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorerSeed {
    /// Datacenters, including any referenced only by game servers
    #[serde(default)]
    pub datacenters: Vec<Datacenter>,
    /// Relays
    #[serde(default)]
    pub relays: Vec<Relay>,
    /// Buyers
    #[serde(default)]
    pub buyers: Vec<Buyer>,
}

/// In-process durable tier backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryStorer {
    relays: DashMap<u64, Relay>,
    buyers: DashMap<u64, Buyer>,
    datacenters: DashMap<u64, Datacenter>,
}

impl InMemoryStorer {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a JSON seed document.
    ///
    /// Relay and datacenter IDs are recomputed from address and name, so a
    /// seed never has to carry hashes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the document does not parse or a
    /// relay name is longer than [`MAX_RELAY_ID_LENGTH`].
    pub fn from_json(data: &[u8]) -> Result<Self, StoreError> {
        let seed: StorerSeed = serde_json::from_slice(data).map_err(|e| StoreError::Corrupt {
            key: "seed".to_string(),
            reason: e.to_string(),
        })?;
        Self::from_seed(seed)
    }

    /// Build a directory from an already parsed seed.
    ///
    /// # Errors
    ///
    /// See [`InMemoryStorer::from_json`].
    pub fn from_seed(seed: StorerSeed) -> Result<Self, StoreError> {
        let storer = Self::new();
        for datacenter in seed.datacenters {
            storer.add_datacenter(datacenter);
        }
        for relay in seed.relays {
            if relay.name.len() > MAX_RELAY_ID_LENGTH {
                return Err(StoreError::Corrupt {
                    key: relay.address.to_string(),
                    reason: format!("relay name longer than {MAX_RELAY_ID_LENGTH} bytes"),
                });
            }
            storer.add_relay(relay);
        }
        for buyer in seed.buyers {
            storer.add_buyer(buyer);
        }
        Ok(storer)
    }

    /// Insert or replace a relay, normalizing its IDs. Returns the relay ID.
    pub fn add_relay(&self, mut relay: Relay) -> u64 {
        relay.id = relay_id(&relay.address.to_string());
        relay.datacenter.id = datacenter_id(&relay.datacenter.name);
        self.datacenters
            .entry(relay.datacenter.id)
            .or_insert_with(|| relay.datacenter.clone());
        let id = relay.id;
        self.relays.insert(id, relay);
        id
    }

    /// Insert or replace a buyer.
    pub fn add_buyer(&self, buyer: Buyer) {
        self.buyers.insert(buyer.id, buyer);
    }

    /// Insert or replace a datacenter, normalizing its ID. Returns the ID.
    pub fn add_datacenter(&self, mut datacenter: Datacenter) -> u64 {
        datacenter.id = datacenter_id(&datacenter.name);
        let id = datacenter.id;
        self.datacenters.insert(id, datacenter);
        id
    }

    /// Set a relay's state out of band, as an operator would.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown relay.
    pub fn set_relay_state(&self, id: u64, state: RelayState) -> Result<(), StoreError> {
        let mut relay = self.relays.get_mut(&id).ok_or(StoreError::NotFound)?;
        relay.state = state;
        Ok(())
    }

    /// Number of relays.
    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }
}

#[async_trait]
impl Storer for InMemoryStorer {
    async fn relay(&self, id: u64) -> Result<Relay, StoreError> {
        self.relays
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn set_relay(&self, relay: &Relay) -> Result<(), StoreError> {
        self.relays.insert(relay.id, relay.clone());
        Ok(())
    }

    async fn relays(&self) -> Result<Vec<Relay>, StoreError> {
        let mut relays: Vec<Relay> = self.relays.iter().map(|r| r.value().clone()).collect();
        relays.sort_by_key(|r| r.id);
        Ok(relays)
    }

    async fn buyer(&self, id: u64) -> Result<Buyer, StoreError> {
        self.buyers
            .get(&id)
            .map(|b| b.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn datacenter(&self, id: u64) -> Result<Datacenter, StoreError> {
        self.datacenters
            .get(&id)
            .map(|d| d.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

/// Hex (de)serialization for fixed 32-byte keys.
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    /// Serialize as lowercase hex.
    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize from 64 hex characters.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", v.len())))
    }
}
