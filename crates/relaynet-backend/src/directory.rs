//! Two-tier relay directory.
//!
//! A relay is live and routable only when both tiers agree: the durable
//! [`Storer`] knows its identity and the [`EphemeralStore`] holds a fresh
//! liveness record. Server and session replay records share the ephemeral
//! tier under their own key prefixes.
//!
//! Every store call runs under [`BackendConfig::store_timeout`](crate::BackendConfig);
//! a call that misses the deadline fails with [`StoreError::Timeout`].

use crate::error::StoreError;
use crate::storer::{Buyer, Datacenter, Relay, Storer};
use crate::store::EphemeralStore;
use relaynet_core::{SdkVersion, TrafficStats};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Key prefix of relay liveness records
pub const RELAY_KEY_PREFIX: &str = "relay/";

/// Key prefix of server replay records
pub const SERVER_KEY_PREFIX: &str = "server/";

/// Key prefix of session replay records
pub const SESSION_KEY_PREFIX: &str = "session/";

/// Ephemeral key of a relay.
#[must_use]
pub fn relay_key(id: u64) -> String {
    format!("{RELAY_KEY_PREFIX}{id:016x}")
}

/// Ephemeral key of a game server.
#[must_use]
pub fn server_key(customer_id: u64, address: &SocketAddr) -> String {
    format!("{SERVER_KEY_PREFIX}{customer_id:016x}/{address}")
}

/// Ephemeral key of a session.
#[must_use]
pub fn session_key(session_id: u64) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id:016x}")
}

/// Value stored in the ephemeral tier with a leading version byte.
trait Record: Serialize + DeserializeOwned {
    const VERSION: u8;

    fn to_record(&self) -> Result<Vec<u8>, StoreError> {
        let body = bincode::serialize(self).map_err(|e| StoreError::Corrupt {
            key: String::new(),
            reason: e.to_string(),
        })?;
        let mut bytes = Vec::with_capacity(1 + body.len());
        bytes.push(Self::VERSION);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    fn from_record(key: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        };
        match bytes.split_first() {
            Some((&version, body)) if version == Self::VERSION => {
                bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))
            }
            Some((&version, _)) => Err(corrupt(format!("unknown record version {version}"))),
            None => Err(corrupt("empty record".to_string())),
        }
    }
}

/// Liveness record of an initialized relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayStoreData {
    /// Relay ID
    pub id: u64,
    /// Public address
    pub address: SocketAddr,
    /// Relay software version from its last update
    pub relay_version: String,
    /// Unix seconds of the last accepted init or update
    pub last_update_time: u64,
    /// Traffic counters from the last update
    pub traffic: TrafficStats,
    /// CPU usage percentage
    pub cpu_usage: f64,
    /// Memory usage percentage
    pub mem_usage: f64,
    /// Datacenter latitude
    pub latitude: f64,
    /// Datacenter longitude
    pub longitude: f64,
}

impl RelayStoreData {
    /// Fresh record for a relay that just completed init.
    #[must_use]
    pub fn initialized(relay: &Relay, now: u64) -> Self {
        Self {
            id: relay.id,
            address: relay.address,
            relay_version: String::new(),
            last_update_time: now,
            traffic: TrafficStats::default(),
            cpu_usage: 0.0,
            mem_usage: 0.0,
            latitude: relay.datacenter.latitude,
            longitude: relay.datacenter.longitude,
        }
    }
}

impl Record for RelayStoreData {
    const VERSION: u8 = 0;
}

/// Replay and liveness record of a game server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCacheEntry {
    /// Highest accepted sequence
    pub sequence: u64,
    /// Owning buyer
    pub customer_id: u64,
    /// Hosting datacenter
    pub datacenter_id: u64,
    /// Server address
    pub server_address: SocketAddr,
    /// Route key sessions encrypt to
    pub route_public_key: [u8; 32],
    /// SDK version of the server
    pub sdk_version: SdkVersion,
    /// Sessions waiting for a route
    pub num_sessions_pending: u32,
    /// Sessions on an accelerated route
    pub num_sessions_upgraded: u32,
    /// Unix seconds of the last accepted update
    pub last_update_time: u64,
}

impl Record for ServerCacheEntry {
    const VERSION: u8 = 0;
}

/// Replay and liveness record of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCacheEntry {
    /// Highest accepted sequence
    pub sequence: u64,
    /// Owning buyer
    pub customer_id: u64,
    /// Session ID
    pub session_id: u64,
    /// Hosting server
    pub server_address: SocketAddr,
    /// Client route key
    pub client_route_public_key: [u8; 32],
    /// SDK version of the hosting server
    pub sdk_version: SdkVersion,
    /// Direct route RTT in milliseconds
    pub direct_rtt: f32,
    /// Direct route jitter in milliseconds
    pub direct_jitter: f32,
    /// Direct route packet loss percentage
    pub direct_packet_loss: f32,
    /// Unix seconds of the last accepted update
    pub last_update_time: u64,
}

impl Record for SessionCacheEntry {
    const VERSION: u8 = 0;
}

/// Durable and ephemeral tiers behind one deadline-bounded handle
pub struct RelayDirectory {
    storer: Arc<dyn Storer>,
    store: Arc<dyn EphemeralStore>,
    timeout: Duration,
}

impl RelayDirectory {
    /// Create a directory over the two tiers.
    pub fn new(storer: Arc<dyn Storer>, store: Arc<dyn EphemeralStore>, timeout: Duration) -> Self {
        Self {
            storer,
            store,
            timeout,
        }
    }

    async fn deadline<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    async fn load<R: Record>(&self, key: &str) -> Result<R, StoreError> {
        let bytes = self.deadline(self.store.get(key)).await?;
        R::from_record(key, &bytes)
    }

    async fn save<R: Record>(&self, key: &str, record: &R, ttl: Duration) -> Result<(), StoreError> {
        let bytes = record.to_record()?;
        self.deadline(self.store.set(key, bytes, ttl)).await
    }

    // ============ Durable tier ============

    /// Durable relay record.
    pub async fn relay(&self, id: u64) -> Result<Relay, StoreError> {
        self.deadline(self.storer.relay(id)).await
    }

    /// Write back a durable relay record.
    pub async fn set_relay(&self, relay: &Relay) -> Result<(), StoreError> {
        self.deadline(self.storer.set_relay(relay)).await
    }

    /// Buyer by customer ID.
    pub async fn buyer(&self, id: u64) -> Result<Buyer, StoreError> {
        self.deadline(self.storer.buyer(id)).await
    }

    /// Datacenter by ID.
    pub async fn datacenter(&self, id: u64) -> Result<Datacenter, StoreError> {
        self.deadline(self.storer.datacenter(id)).await
    }

    // ============ Relay liveness ============

    /// Liveness record of a relay.
    pub async fn get(&self, id: u64) -> Result<RelayStoreData, StoreError> {
        self.load(&relay_key(id)).await
    }

    /// Overwrite a relay's liveness record.
    pub async fn set(&self, data: &RelayStoreData, ttl: Duration) -> Result<(), StoreError> {
        self.save(&relay_key(data.id), data, ttl).await
    }

    /// Remove a relay's liveness record.
    pub async fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.deadline(self.store.delete(&relay_key(id))).await
    }

    /// Refresh a relay's TTL without rewriting it. Returns false if it had
    /// already expired.
    pub async fn expire_reset(&self, id: u64, ttl: Duration) -> Result<bool, StoreError> {
        self.deadline(self.store.expire(&relay_key(id), ttl)).await
    }

    /// Every decodable relay liveness record, ordered by key.
    ///
    /// Corrupt records are logged and skipped.
    pub async fn get_all(&self) -> Result<Vec<RelayStoreData>, StoreError> {
        let entries = self.deadline(self.store.get_all(RELAY_KEY_PREFIX)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, bytes)| match RelayStoreData::from_record(&key, &bytes) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping corrupt relay record");
                    None
                }
            })
            .collect())
    }

    /// Durable records of every relay with a live ephemeral record, ordered by ID.
    ///
    /// A live record with no durable counterpart is skipped.
    pub async fn live_relays(&self) -> Result<Vec<Relay>, StoreError> {
        let live = self.get_all().await?;
        if live.is_empty() {
            return Ok(Vec::new());
        }
        let mut durable: HashMap<u64, Relay> = self
            .deadline(self.storer.relays())
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let mut relays: Vec<Relay> = live
            .iter()
            .filter_map(|data| durable.remove(&data.id))
            .collect();
        relays.sort_by_key(|r| r.id);
        Ok(relays)
    }

    // ============ Server and session replay records ============

    /// Server replay record.
    pub async fn server(
        &self,
        customer_id: u64,
        address: &SocketAddr,
    ) -> Result<ServerCacheEntry, StoreError> {
        self.load(&server_key(customer_id, address)).await
    }

    /// Overwrite a server replay record.
    pub async fn set_server(&self, entry: &ServerCacheEntry, ttl: Duration) -> Result<(), StoreError> {
        self.save(&server_key(entry.customer_id, &entry.server_address), entry, ttl)
            .await
    }

    /// Session replay record.
    pub async fn session(&self, session_id: u64) -> Result<SessionCacheEntry, StoreError> {
        self.load(&session_key(session_id)).await
    }

    /// Overwrite a session replay record.
    pub async fn set_session(
        &self,
        entry: &SessionCacheEntry,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.save(&session_key(entry.session_id), entry, ttl).await
    }
}

impl std::fmt::Debug for RelayDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDirectory")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storer::{InMemoryStorer, Seller};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    const TTL: Duration = Duration::from_secs(30);

    fn relay(address: &str) -> Relay {
        Relay::new(
            address,
            address.parse().unwrap(),
            [9u8; 32],
            Datacenter::new("test.dc", 10.0, 20.0),
            Seller {
                id: "s".into(),
                name: "Seller".into(),
                egress_price_cents: 0,
            },
        )
    }

    fn directory() -> (Arc<InMemoryStorer>, Arc<InMemoryStore>, RelayDirectory) {
        let storer = Arc::new(InMemoryStorer::new());
        let store = Arc::new(InMemoryStore::new());
        let directory = RelayDirectory::new(storer.clone(), store.clone(), Duration::from_secs(3));
        (storer, store, directory)
    }

    #[test]
    fn test_keys() {
        assert_eq!(relay_key(0xabc), "relay/0000000000000abc");
        assert_eq!(
            server_key(1, &"1.2.3.4:5".parse().unwrap()),
            "server/0000000000000001/1.2.3.4:5"
        );
        assert_eq!(session_key(2), "session/0000000000000002");
    }

    #[tokio::test]
    async fn test_relay_record_roundtrip() {
        let (_, _, directory) = directory();
        let relay = relay("10.0.0.1:40000");
        let mut data = RelayStoreData::initialized(&relay, 1_700_000_000);
        data.relay_version = "2.1.0".into();
        data.traffic.session_count = 12;

        directory.set(&data, TTL).await.unwrap();
        assert_eq!(directory.get(relay.id).await.unwrap(), data);
        assert_eq!(data.latitude, 10.0);

        directory.delete(relay.id).await.unwrap();
        assert_eq!(directory.get(relay.id).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_get_all_skips_corrupt() {
        let (_, store, directory) = directory();
        let good = relay("10.0.0.1:40000");
        directory
            .set(&RelayStoreData::initialized(&good, 1), TTL)
            .await
            .unwrap();
        store.set("relay/garbage", vec![0, 1, 2], TTL).await.unwrap();
        store.set("relay/future", vec![9, 0, 0], TTL).await.unwrap();
        store.set("relay/empty", Vec::new(), TTL).await.unwrap();

        let all = directory.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, good.id);
    }

    #[tokio::test]
    async fn test_corrupt_get_is_reported() {
        let (_, store, directory) = directory();
        store.set(&relay_key(7), vec![0, 1], TTL).await.unwrap();
        assert!(matches!(
            directory.get(7).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_live_relays_joins_tiers() {
        let (storer, _, directory) = directory();
        let a = relay("10.0.0.1:40000");
        let b = relay("10.0.0.2:40000");
        let orphan = relay("10.0.0.3:40000");
        storer.add_relay(a.clone());
        storer.add_relay(b.clone());

        for r in [&a, &orphan] {
            directory
                .set(&RelayStoreData::initialized(r, 1), TTL)
                .await
                .unwrap();
        }

        let live = directory.live_relays().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, a.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_reset() {
        let (_, _, directory) = directory();
        let r = relay("10.0.0.1:40000");
        directory
            .set(&RelayStoreData::initialized(&r, 1), TTL)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(directory.expire_reset(r.id, TTL).await.unwrap());
        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(directory.get(r.id).await.is_ok());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!directory.expire_reset(r.id, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_and_session_records() {
        let (_, _, directory) = directory();
        let address: SocketAddr = "1.2.3.4:5000".parse().unwrap();
        let server = ServerCacheEntry {
            sequence: 3,
            customer_id: 42,
            datacenter_id: 7,
            server_address: address,
            route_public_key: [4u8; 32],
            sdk_version: SdkVersion::new(4, 0, 1),
            num_sessions_pending: 1,
            num_sessions_upgraded: 2,
            last_update_time: 100,
        };
        directory.set_server(&server, TTL).await.unwrap();
        assert_eq!(directory.server(42, &address).await.unwrap(), server);
        assert_eq!(
            directory.server(43, &address).await,
            Err(StoreError::NotFound)
        );

        let session = SessionCacheEntry {
            sequence: 1,
            customer_id: 42,
            session_id: 99,
            server_address: address,
            client_route_public_key: [5u8; 32],
            sdk_version: SdkVersion::new(4, 0, 1),
            direct_rtt: 30.0,
            direct_jitter: 1.0,
            direct_packet_loss: 0.0,
            last_update_time: 100,
        };
        directory.set_session(&session, TTL).await.unwrap();
        assert_eq!(directory.session(99).await.unwrap(), session);
    }

    struct StalledStore;

    #[async_trait]
    impl EphemeralStore for StalledStore {
        async fn get(&self, _key: &str) -> Result<Vec<u8>, StoreError> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn get_all(&self, _prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
            std::future::pending().await
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_times_out() {
        let directory = RelayDirectory::new(
            Arc::new(InMemoryStorer::new()),
            Arc::new(StalledStore),
            Duration::from_secs(3),
        );
        assert_eq!(
            directory.get(1).await,
            Err(StoreError::Timeout(Duration::from_secs(3)))
        );
        assert_eq!(
            directory.get_all().await,
            Err(StoreError::Timeout(Duration::from_secs(3)))
        );
    }
}
