//! Relay init and update handlers.
//!
//! # Init
//!
//! ```text
//! decode -> magic -> durable lookup -> lifecycle(Init) -> open sealed token
//!        -> not already live -> durable state write -> ephemeral write
//! ```
//!
//! # Update
//!
//! ```text
//! decode -> durable lookup -> ephemeral lookup -> token check
//!        -> shutdown? (state write, ephemeral delete, empty peer list)
//!        -> lifecycle(Update) -> fold ping stats -> ephemeral write
//!        -> select peers from the live snapshot
//! ```
//!
//! Nothing is written before every check has passed. When one tier is written
//! and the next write fails the error is still reported; the relay's next
//! update overwrites both tiers.

use super::{ContentType, HexId, Response, log_rejection, unix_millis, unix_seconds};
use crate::context::BackendContext;
use crate::directory::RelayStoreData;
use crate::error::{HandlerError, StoreError};
use crate::ping_mesh::select_peers;
use crate::state::{LifecycleEvent, transition};
use crate::storer::Relay;
use relaynet_core::{
    INIT_REQUEST_MAGIC, Packet, RelayInitRequest, RelayInitResponse, RelayUpdateRequest,
    RelayUpdateResponse,
};
use relaynet_crypto::hash::relay_id;
use relaynet_crypto::sealed_box::{Nonce, open_token};
use relaynet_crypto::x25519::PublicKey;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// Handle a relay init request.
///
/// # Errors
///
/// See [`HandlerError::status`] for how each rejection maps to a status.
pub async fn relay_init(
    ctx: &BackendContext,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response, HandlerError> {
    init(ctx, content_type, body)
        .await
        .inspect_err(|e| log_rejection("relay_init", e))
}

async fn init(
    ctx: &BackendContext,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response, HandlerError> {
    let content_type = ContentType::parse(content_type)?;
    let request = match content_type {
        ContentType::OctetStream => RelayInitRequest::decode(body)?,
        ContentType::Json => RelayInitRequest::from_json(body)?,
    };

    if request.magic != INIT_REQUEST_MAGIC {
        return Err(HandlerError::InvalidMagic(request.magic));
    }

    let id = relay_id(&request.address.to_string());
    let mut relay = lookup_relay(ctx, id).await?;

    let next_state = transition(relay.state, LifecycleEvent::Init)
        .map_err(|source| HandlerError::Lifecycle { id, source })?;

    open_token(
        &request.encrypted_token,
        &Nonce::from_bytes(request.nonce),
        &PublicKey::from_bytes(relay.public_key),
        &ctx.keys.relay_private,
    )
    .map_err(HandlerError::AuthFailed)?;

    match ctx.directory.get(id).await {
        Ok(_) => return Err(HandlerError::AlreadyInitialized(id)),
        Err(StoreError::NotFound) => {}
        Err(StoreError::Corrupt { .. }) => {
            debug!(relay_id = %HexId(id), "overwriting corrupt relay record");
        }
        Err(e) => return Err(e.into()),
    }

    let now = unix_seconds();
    relay.state = next_state;
    ctx.directory.set_relay(&relay).await?;
    ctx.directory
        .set(&RelayStoreData::initialized(&relay, now), ctx.config.relay_ttl)
        .await?;

    info!(
        relay_id = %HexId(id),
        relay_addr = %relay.address,
        relay_name = %relay.name,
        "relay initialized"
    );

    let body = match content_type {
        ContentType::OctetStream => RelayInitResponse {
            version: 0,
            timestamp: now,
            public_key: relay.public_key,
        }
        .encode(),
        ContentType::Json => RelayInitResponse {
            version: 0,
            timestamp: unix_millis(),
            public_key: relay.public_key,
        }
        .to_json(),
    }
    .map_err(HandlerError::Encode)?;

    Ok(Response::ok(content_type, body))
}

/// Handle a relay update request.
///
/// # Errors
///
/// See [`HandlerError::status`] for how each rejection maps to a status.
pub async fn relay_update(
    ctx: &BackendContext,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response, HandlerError> {
    update(ctx, content_type, body)
        .await
        .inspect_err(|e| log_rejection("relay_update", e))
}

async fn update(
    ctx: &BackendContext,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response, HandlerError> {
    let content_type = ContentType::parse(content_type)?;
    let request = match content_type {
        ContentType::OctetStream => RelayUpdateRequest::decode(body)?,
        ContentType::Json => RelayUpdateRequest::from_json(body)?,
    };

    let id = relay_id(&request.address.to_string());
    let mut relay = lookup_relay(ctx, id).await?;

    let previous = match ctx.directory.get(id).await {
        Ok(data) => data,
        Err(StoreError::NotFound | StoreError::Corrupt { .. }) => {
            return Err(HandlerError::RelayNotInitialized(id));
        }
        Err(e) => return Err(e.into()),
    };

    if !bool::from(request.token.ct_eq(&relay.public_key)) {
        return Err(HandlerError::TokenMismatch(id));
    }

    let now = unix_seconds();

    if request.shutting_down {
        let next_state = transition(relay.state, LifecycleEvent::Shutdown)
            .map_err(|source| HandlerError::Lifecycle { id, source })?;
        if next_state != relay.state {
            relay.state = next_state;
            ctx.directory.set_relay(&relay).await?;
        }
        ctx.directory.delete(id).await?;
        ctx.stats.delete_entry(id);

        info!(
            relay_id = %HexId(id),
            relay_addr = %relay.address,
            state = %relay.state,
            "relay shutting down"
        );
        return respond(content_type, now, Vec::new());
    }

    transition(relay.state, LifecycleEvent::Update)
        .map_err(|source| HandlerError::Lifecycle { id, source })?;

    ctx.stats.process_stats(id, &request.ping_stats);

    let data = RelayStoreData {
        id,
        address: relay.address,
        relay_version: request.relay_version,
        last_update_time: now.max(previous.last_update_time),
        traffic: request.traffic_stats,
        cpu_usage: request.cpu_usage,
        mem_usage: request.mem_usage,
        latitude: relay.datacenter.latitude,
        longitude: relay.datacenter.longitude,
    };
    ctx.directory.set(&data, ctx.config.relay_ttl).await?;

    let live = ctx.directory.live_relays().await?;
    let peers = select_peers(&relay, &live);

    debug!(
        relay_id = %HexId(id),
        relay_addr = %relay.address,
        ping_stats = request.ping_stats.len(),
        peers = peers.len(),
        "relay updated"
    );

    respond(content_type, now, peers)
}

async fn lookup_relay(ctx: &BackendContext, id: u64) -> Result<Relay, HandlerError> {
    ctx.directory.relay(id).await.map_err(|e| match e {
        StoreError::NotFound => HandlerError::RelayNotFound(id),
        other => HandlerError::Store(other),
    })
}

fn respond(
    content_type: ContentType,
    now: u64,
    relays_to_ping: Vec<relaynet_core::RelayPingTarget>,
) -> Result<Response, HandlerError> {
    let response = RelayUpdateResponse {
        version: 0,
        timestamp: now,
        relays_to_ping,
    };
    let body = match content_type {
        ContentType::OctetStream => response.encode(),
        ContentType::Json => response.to_json(),
    }
    .map_err(HandlerError::Encode)?;
    Ok(Response::ok(content_type, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::context::BackendKeys;
    use crate::state::RelayState;
    use crate::store::InMemoryStore;
    use crate::storer::{Datacenter, InMemoryStorer, Seller};
    use rand_core::OsRng;
    use relaynet_core::{RelayPingStats, TrafficStats};
    use relaynet_crypto::sealed_box::{generate_token, seal_token};
    use relaynet_crypto::x25519::PrivateKey;
    use std::net::SocketAddr;
    use std::sync::Arc;

    struct Fixture {
        ctx: BackendContext,
        storer: Arc<InMemoryStorer>,
        store: Arc<InMemoryStore>,
    }

    struct TestRelay {
        key: PrivateKey,
        address: SocketAddr,
        id: u64,
    }

    fn fixture() -> Fixture {
        let storer = Arc::new(InMemoryStorer::new());
        let store = Arc::new(InMemoryStore::new());
        let ctx = BackendContext::new(
            storer.clone(),
            store.clone(),
            BackendKeys::generate(&mut OsRng),
            BackendConfig::default(),
        );
        Fixture { ctx, storer, store }
    }

    fn add_relay(f: &Fixture, address: &str) -> TestRelay {
        let key = PrivateKey::generate(&mut OsRng);
        let address: SocketAddr = address.parse().unwrap();
        let relay = Relay::new(
            "relay",
            address,
            key.public_key().to_bytes(),
            Datacenter::new("test.dc", 0.0, 0.0),
            Seller {
                id: "s".into(),
                name: "Seller".into(),
                egress_price_cents: 0,
            },
        );
        let id = f.storer.add_relay(relay);
        TestRelay { key, address, id }
    }

    fn init_request(f: &Fixture, relay: &TestRelay) -> RelayInitRequest {
        let nonce = Nonce::generate(&mut OsRng);
        let token = generate_token(&mut OsRng);
        let encrypted_token =
            seal_token(&token, &nonce, &relay.key, &f.ctx.keys.relay_public()).unwrap();
        RelayInitRequest {
            magic: INIT_REQUEST_MAGIC,
            version: 0,
            nonce: *nonce.as_bytes(),
            address: relay.address,
            encrypted_token,
        }
    }

    fn update_request(relay: &TestRelay, ping_stats: Vec<RelayPingStats>) -> RelayUpdateRequest {
        RelayUpdateRequest {
            version: 1,
            address: relay.address,
            token: relay.key.public_key().to_bytes(),
            ping_stats,
            traffic_stats: TrafficStats::default(),
            shutting_down: false,
            cpu_usage: 5.0,
            mem_usage: 10.0,
            relay_version: "1.0.0".into(),
        }
    }

    async fn init_ok(f: &Fixture, relay: &TestRelay) {
        let body = init_request(f, relay).encode().unwrap();
        relay_init(&f.ctx, None, &body).await.unwrap();
    }

    async fn update_peers(f: &Fixture, request: &RelayUpdateRequest) -> Vec<u64> {
        let response = relay_update(&f.ctx, None, &request.encode().unwrap())
            .await
            .unwrap();
        RelayUpdateResponse::decode(&response.body)
            .unwrap()
            .relays_to_ping
            .iter()
            .map(|p| p.id)
            .collect()
    }

    #[tokio::test]
    async fn test_init_success() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        let before = unix_seconds();

        let body = init_request(&f, &relay).encode().unwrap();
        let response = relay_init(&f.ctx, Some("application/octet-stream"), &body)
            .await
            .unwrap();
        assert_eq!(response.status.code(), 200);

        let decoded = RelayInitResponse::decode(&response.body).unwrap();
        assert_eq!(decoded.public_key, relay.key.public_key().to_bytes());
        assert!(decoded.timestamp >= before);

        let stored = f.ctx.directory.relay(relay.id).await.unwrap();
        assert_eq!(stored.state, RelayState::Enabled);
        assert!(f.ctx.directory.get(relay.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_init_json_timestamp_in_millis() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        let body = init_request(&f, &relay).to_json().unwrap();

        let response = relay_init(&f.ctx, Some("application/json"), &body)
            .await
            .unwrap();
        assert_eq!(response.content_type, ContentType::Json);
        let decoded = RelayInitResponse::from_json(&response.body).unwrap();
        assert!(decoded.timestamp > unix_seconds() * 100);
    }

    #[tokio::test]
    async fn test_init_rejections() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");

        let mut bad_magic = init_request(&f, &relay);
        bad_magic.magic = 1;
        let err = relay_init(&f.ctx, None, &bad_magic.encode().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidMagic(1)));

        let unknown = TestRelay {
            key: PrivateKey::generate(&mut OsRng),
            address: "10.9.9.9:40000".parse().unwrap(),
            id: 0,
        };
        let err = relay_init(&f.ctx, None, &init_request(&f, &unknown).encode().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status().code(), 404);

        let err = relay_init(&f.ctx, Some("text/xml"), b"<init/>")
            .await
            .unwrap_err();
        assert_eq!(err.status().code(), 400);

        let err = relay_init(&f.ctx, None, &[0x8f, 0x70]).await.unwrap_err();
        assert!(matches!(err, HandlerError::Decode(_)));
    }

    #[tokio::test]
    async fn test_init_wrong_key_is_unauthorized() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        let impostor = TestRelay {
            key: PrivateKey::generate(&mut OsRng),
            address: relay.address,
            id: relay.id,
        };

        let body = init_request(&f, &impostor).encode().unwrap();
        let err = relay_init(&f.ctx, None, &body).await.unwrap_err();
        assert!(matches!(err, HandlerError::AuthFailed(_)));
        assert_eq!(err.status().code(), 401);
        assert!(f.ctx.directory.get(relay.id).await.is_err());
        assert_eq!(
            f.ctx.directory.relay(relay.id).await.unwrap().state,
            RelayState::Offline
        );
    }

    #[tokio::test]
    async fn test_init_quarantined_is_refused() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        f.storer
            .set_relay_state(relay.id, RelayState::Quarantine)
            .unwrap();

        let body = init_request(&f, &relay).encode().unwrap();
        let err = relay_init(&f.ctx, None, &body).await.unwrap_err();
        assert_eq!(err.status().code(), 401);
        assert!(f.store.is_empty());
        assert_eq!(
            f.ctx.directory.relay(relay.id).await.unwrap().state,
            RelayState::Quarantine
        );
    }

    #[tokio::test]
    async fn test_duplicate_init_conflicts() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        init_ok(&f, &relay).await;

        let body = init_request(&f, &relay).encode().unwrap();
        let err = relay_init(&f.ctx, None, &body).await.unwrap_err();
        assert!(matches!(err, HandlerError::AlreadyInitialized(_)));
        assert_eq!(err.status().code(), 409);
    }

    #[tokio::test]
    async fn test_update_requires_init() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        let body = update_request(&relay, Vec::new()).encode().unwrap();
        let err = relay_update(&f.ctx, None, &body).await.unwrap_err();
        assert!(matches!(err, HandlerError::RelayNotInitialized(_)));
        assert_eq!(err.status().code(), 404);
    }

    #[tokio::test]
    async fn test_update_token_mismatch() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        init_ok(&f, &relay).await;

        let mut request = update_request(&relay, Vec::new());
        request.token = [0xee; 32];
        let err = relay_update(&f.ctx, None, &request.encode().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::TokenMismatch(_)));
        assert_eq!(err.status().code(), 401);
    }

    #[tokio::test]
    async fn test_update_not_enabled_is_refused() {
        let f = fixture();
        let relay = add_relay(&f, "10.0.0.1:40000");
        init_ok(&f, &relay).await;
        f.storer
            .set_relay_state(relay.id, RelayState::Disabled)
            .unwrap();

        let request = update_request(
            &relay,
            vec![RelayPingStats {
                relay_id: 77,
                rtt: 1.0,
                jitter: 0.0,
                packet_loss: 0.0,
            }],
        );
        let err = relay_update(&f.ctx, None, &request.encode().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status().code(), 401);
        assert!(f.ctx.stats.is_empty());
    }

    #[tokio::test]
    async fn test_two_relays_discover_each_other() {
        let f = fixture();
        let a = add_relay(&f, "10.0.0.1:40000");
        let b = add_relay(&f, "10.0.0.2:40000");

        init_ok(&f, &a).await;
        assert!(update_peers(&f, &update_request(&a, Vec::new())).await.is_empty());

        init_ok(&f, &b).await;
        assert_eq!(update_peers(&f, &update_request(&b, Vec::new())).await, [a.id]);
        assert_eq!(update_peers(&f, &update_request(&a, Vec::new())).await, [b.id]);
    }

    #[tokio::test]
    async fn test_update_folds_stats() {
        let f = fixture();
        let a = add_relay(&f, "10.0.0.1:40000");
        init_ok(&f, &a).await;

        let stats = vec![
            RelayPingStats {
                relay_id: 5,
                rtt: 12.0,
                jitter: 1.0,
                packet_loss: 0.0,
            },
            RelayPingStats {
                relay_id: a.id,
                rtt: 0.0,
                jitter: 0.0,
                packet_loss: 0.0,
            },
        ];
        update_peers(&f, &update_request(&a, stats)).await;
        assert_eq!(f.ctx.stats.peers(a.id), [5]);

        let data = f.ctx.directory.get(a.id).await.unwrap();
        assert_eq!(data.relay_version, "1.0.0");
        assert_eq!(data.cpu_usage, 5.0);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_mesh() {
        let f = fixture();
        let a = add_relay(&f, "10.0.0.1:40000");
        let b = add_relay(&f, "10.0.0.2:40000");
        init_ok(&f, &a).await;
        init_ok(&f, &b).await;
        update_peers(&f, &update_request(&a, Vec::new())).await;

        let mut shutdown = update_request(&a, Vec::new());
        shutdown.shutting_down = true;
        assert!(update_peers(&f, &shutdown).await.is_empty());

        assert_eq!(
            f.ctx.directory.relay(a.id).await.unwrap().state,
            RelayState::Maintenance
        );
        assert_eq!(f.ctx.directory.get(a.id).await, Err(StoreError::NotFound));
        assert!(f.ctx.stats.peers(a.id).is_empty());
        assert!(update_peers(&f, &update_request(&b, Vec::new())).await.is_empty());
    }

    #[tokio::test]
    async fn test_json_update() {
        let f = fixture();
        let a = add_relay(&f, "10.0.0.1:40000");
        init_ok(&f, &a).await;

        let body = update_request(&a, Vec::new()).to_json().unwrap();
        let response = relay_update(&f.ctx, Some("application/json"), &body)
            .await
            .unwrap();
        let decoded = RelayUpdateResponse::from_json(&response.body).unwrap();
        assert!(decoded.relays_to_ping.is_empty());
    }

    #[tokio::test]
    async fn test_json_update_stores_version_layout() {
        let f = fixture();
        let a = add_relay(&f, "10.0.0.1:40000");
        init_ok(&f, &a).await;

        let mut request = update_request(&a, Vec::new());
        request.version = 0;
        let mut doc: serde_json::Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        doc["traffic_stats"]["pong_rx"] = 77.into();
        doc["traffic_stats"]["bytes_sent"] = 99.into();
        let body = serde_json::to_vec(&doc).unwrap();

        relay_update(&f.ctx, Some("application/json"), &body)
            .await
            .unwrap();
        let stored = f.ctx.directory.get(a.id).await.unwrap().traffic;
        assert_eq!(stored.pong_rx, 0);
        assert_eq!(stored.bytes_sent, 99);
    }
}

