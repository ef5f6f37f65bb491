//! Game server and session handlers.
//!
//! Server packets are signed with the buyer's Ed25519 key. A server init or
//! server update that fails a check is rejected. A session update that fails
//! authentication still gets a signed direct-route response, so the session
//! keeps playing without acceleration.

use super::{HexId, log_rejection, unix_seconds};
use crate::context::BackendContext;
use crate::directory::{ServerCacheEntry, SessionCacheEntry};
use crate::error::{HandlerError, StoreError};
use crate::ping_mesh::near_relays;
use relaynet_core::packets::server::packet_type;
use relaynet_core::{
    InitResponseCode, MAX_NEAR_RELAYS, NearRelay, Packet, PacketError, ServerInitRequest,
    ServerInitResponse, ServerUpdate, SessionResponse, SessionUpdate, SignedPacket,
};
use relaynet_crypto::ED25519_SIGNATURE_SIZE;
use tracing::{debug, info, warn};

/// Dispatch one server datagram by its leading packet type byte.
///
/// Returns the reply datagram, if the packet kind has one.
///
/// # Errors
///
/// Returns [`HandlerError::Decode`] for an empty datagram or unknown packet
/// type, otherwise whatever the packet's handler returns.
pub async fn handle_server_packet(
    ctx: &BackendContext,
    datagram: &[u8],
) -> Result<Option<Vec<u8>>, HandlerError> {
    let (&kind, body) = datagram
        .split_first()
        .ok_or(PacketError::Truncated {
            field: "packet type",
        })?;

    match kind {
        packet_type::SERVER_INIT_REQUEST => {
            let response = server_init(ctx, body).await?;
            Ok(Some(frame(packet_type::SERVER_INIT_RESPONSE, &response)?))
        }
        packet_type::SERVER_UPDATE => {
            server_update(ctx, body).await?;
            Ok(None)
        }
        packet_type::SESSION_UPDATE => {
            let response = session_update(ctx, body).await?;
            Ok(Some(frame(packet_type::SESSION_RESPONSE, &response)?))
        }
        other => Err(PacketError::InvalidValue {
            field: "packet type",
            value: u64::from(other),
        }
        .into()),
    }
}

fn frame<P: Packet>(kind: u8, packet: &P) -> Result<Vec<u8>, HandlerError> {
    let body = packet.encode().map_err(HandlerError::Encode)?;
    let mut datagram = Vec::with_capacity(1 + body.len());
    datagram.push(kind);
    datagram.extend_from_slice(&body);
    Ok(datagram)
}

fn sign<P: SignedPacket>(ctx: &BackendContext, packet: &mut P) -> Result<(), HandlerError> {
    packet
        .sign(&ctx.keys.signing)
        .map_err(HandlerError::Encode)
}

/// Handle a server init request.
///
/// Every outcome the server can act on is reported as a signed response
/// code rather than an error.
///
/// # Errors
///
/// Decode failures, store failures other than not-found, and encode failures.
pub async fn server_init(
    ctx: &BackendContext,
    body: &[u8],
) -> Result<ServerInitResponse, HandlerError> {
    init(ctx, body)
        .await
        .inspect_err(|e| log_rejection("server_init", e))
}

async fn init(ctx: &BackendContext, body: &[u8]) -> Result<ServerInitResponse, HandlerError> {
    let request = ServerInitRequest::decode(body)?;
    let response = init_response_code(ctx, &request).await?;

    if response == InitResponseCode::Ok {
        info!(
            customer_id = %HexId(request.customer_id),
            datacenter_id = %HexId(request.datacenter_id),
            sdk = %request.sdk_version,
            "server initialized"
        );
    } else {
        warn!(
            customer_id = %HexId(request.customer_id),
            datacenter_id = %HexId(request.datacenter_id),
            response = ?response,
            "server init refused"
        );
    }

    let mut packet = ServerInitResponse {
        version: 0,
        request_id: request.request_id,
        response,
        signature: [0u8; ED25519_SIGNATURE_SIZE],
    };
    sign(ctx, &mut packet)?;
    Ok(packet)
}

async fn init_response_code(
    ctx: &BackendContext,
    request: &ServerInitRequest,
) -> Result<InitResponseCode, HandlerError> {
    if request.sdk_version < ctx.config.sdk_version_min {
        return Ok(InitResponseCode::OldSdkVersion);
    }
    let buyer = match ctx.directory.buyer(request.customer_id).await {
        Ok(buyer) => buyer,
        Err(StoreError::NotFound) => return Ok(InitResponseCode::UnknownCustomer),
        Err(e) => return Err(e.into()),
    };
    if request.verify(&buyer.public_key).is_err() {
        return Ok(InitResponseCode::SignatureCheckFailed);
    }
    match ctx.directory.datacenter(request.datacenter_id).await {
        Ok(_) => Ok(InitResponseCode::Ok),
        Err(StoreError::NotFound) => Ok(InitResponseCode::UnknownDatacenter),
        Err(e) => Err(e.into()),
    }
}

/// Handle a server update. Server updates have no reply.
///
/// # Errors
///
/// Rejects old SDKs, unknown buyers, bad signatures and sequences that are
/// not newer than the stored one.
pub async fn server_update(ctx: &BackendContext, body: &[u8]) -> Result<(), HandlerError> {
    update(ctx, body)
        .await
        .inspect_err(|e| log_rejection("server_update", e))
}

async fn update(ctx: &BackendContext, body: &[u8]) -> Result<(), HandlerError> {
    let request = ServerUpdate::decode(body)?;

    if request.sdk_version < ctx.config.sdk_version_min {
        return Err(HandlerError::SdkTooOld {
            version: request.sdk_version,
            minimum: ctx.config.sdk_version_min,
        });
    }

    let buyer = ctx
        .directory
        .buyer(request.customer_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => HandlerError::BuyerNotFound(request.customer_id),
            other => HandlerError::Store(other),
        })?;
    request
        .verify(&buyer.public_key)
        .map_err(HandlerError::AuthFailed)?;

    match ctx.directory.datacenter(request.datacenter_id).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            debug!(
                customer_id = %HexId(request.customer_id),
                datacenter_id = %HexId(request.datacenter_id),
                "server in unknown datacenter"
            );
        }
        Err(e) => return Err(e.into()),
    }

    match ctx
        .directory
        .server(request.customer_id, &request.server_address)
        .await
    {
        Ok(stored) if request.sequence <= stored.sequence => {
            return Err(HandlerError::StaleSequence {
                received: request.sequence,
                stored: stored.sequence,
            });
        }
        Ok(_) | Err(StoreError::NotFound | StoreError::Corrupt { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    let entry = ServerCacheEntry {
        sequence: request.sequence,
        customer_id: request.customer_id,
        datacenter_id: request.datacenter_id,
        server_address: request.server_address,
        route_public_key: request.server_route_public_key,
        sdk_version: request.sdk_version,
        num_sessions_pending: request.num_sessions_pending,
        num_sessions_upgraded: request.num_sessions_upgraded,
        last_update_time: unix_seconds(),
    };
    ctx.directory
        .set_server(&entry, ctx.config.server_ttl)
        .await?;

    debug!(
        customer_id = %HexId(request.customer_id),
        server_addr = %request.server_address,
        sequence = request.sequence,
        "server updated"
    );
    Ok(())
}

/// Handle a session update.
///
/// # Errors
///
/// Decode failures, an unknown server, stale sequences and store failures.
/// Authentication failures produce a direct-route fallback instead.
pub async fn session_update(
    ctx: &BackendContext,
    body: &[u8],
) -> Result<SessionResponse, HandlerError> {
    session(ctx, body)
        .await
        .inspect_err(|e| log_rejection("session_update", e))
}

async fn session(ctx: &BackendContext, body: &[u8]) -> Result<SessionResponse, HandlerError> {
    let request = SessionUpdate::decode(body)?;

    let server = ctx
        .directory
        .server(request.customer_id, &request.server_address)
        .await
        .map_err(|e| match e {
            StoreError::NotFound | StoreError::Corrupt { .. } => HandlerError::ServerNotFound {
                customer_id: request.customer_id,
                address: request.server_address.to_string(),
            },
            other => HandlerError::Store(other),
        })?;

    let buyer = match ctx.directory.buyer(request.customer_id).await {
        Ok(buyer) => buyer,
        Err(StoreError::NotFound) => {
            warn!(
                customer_id = %HexId(request.customer_id),
                session_id = %HexId(request.session_id),
                "session for unknown buyer, falling back to direct"
            );
            return fallback(ctx, &request, &server);
        }
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = request.verify(&buyer.public_key) {
        warn!(
            customer_id = %HexId(request.customer_id),
            session_id = %HexId(request.session_id),
            error = %e,
            "session signature check failed, falling back to direct"
        );
        return fallback(ctx, &request, &server);
    }

    match ctx.directory.session(request.session_id).await {
        Ok(stored) if request.sequence <= stored.sequence => {
            return Err(HandlerError::StaleSequence {
                received: request.sequence,
                stored: stored.sequence,
            });
        }
        Ok(_) | Err(StoreError::NotFound | StoreError::Corrupt { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    let entry = SessionCacheEntry {
        sequence: request.sequence,
        customer_id: request.customer_id,
        session_id: request.session_id,
        server_address: request.server_address,
        client_route_public_key: request.client_route_public_key,
        sdk_version: server.sdk_version,
        direct_rtt: request.direct.rtt_mean,
        direct_jitter: request.direct.jitter,
        direct_packet_loss: request.direct.packet_loss,
        last_update_time: unix_seconds(),
    };
    ctx.directory
        .set_session(&entry, ctx.config.session_ttl)
        .await?;

    let near = session_near_relays(ctx, &server).await?;

    debug!(
        customer_id = %HexId(request.customer_id),
        session_id = %HexId(request.session_id),
        sequence = request.sequence,
        near_relays = near.len(),
        "session updated"
    );

    let mut response = SessionResponse::direct(
        request.sequence,
        request.session_id,
        near,
        server.route_public_key,
    );
    sign(ctx, &mut response)?;
    Ok(response)
}

async fn session_near_relays(
    ctx: &BackendContext,
    server: &ServerCacheEntry,
) -> Result<Vec<NearRelay>, HandlerError> {
    let datacenter = match ctx.directory.datacenter(server.datacenter_id).await {
        Ok(datacenter) => datacenter,
        Err(StoreError::NotFound) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let live = ctx.directory.live_relays().await?;
    Ok(near_relays(
        datacenter.latitude,
        datacenter.longitude,
        &live,
        MAX_NEAR_RELAYS,
    ))
}

/// Signed direct-route response that mutates nothing.
fn fallback(
    ctx: &BackendContext,
    request: &SessionUpdate,
    server: &ServerCacheEntry,
) -> Result<SessionResponse, HandlerError> {
    let mut response = SessionResponse::direct(
        request.sequence,
        request.session_id,
        Vec::new(),
        server.route_public_key,
    );
    sign(ctx, &mut response)?;
    Ok(response)
}
