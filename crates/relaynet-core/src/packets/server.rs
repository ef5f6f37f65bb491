//! Game server and session packets.
//!
//! All packets here are signed: the last field is an Ed25519 signature over
//! every preceding byte. Servers and sessions sign with their customer key,
//! the backend signs its responses with its own key.

use super::{Packet, SignedPacket};
use crate::codec::{Reader, Writer, check_version};
use crate::error::PacketError;
use crate::{
    CONTINUE_ROUTE_TOKEN_SIZE, MAX_NEAR_RELAYS, MAX_RELAY_ADDRESS_LENGTH, MAX_ROUTE_TOKENS,
    NEW_ROUTE_TOKEN_SIZE, ROUTE_PUBLIC_KEY_SIZE,
};
use relaynet_crypto::ED25519_SIGNATURE_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Packet type identifiers used by the game-facing UDP transport.
pub mod packet_type {
    /// Server update
    pub const SERVER_UPDATE: u8 = 200;
    /// Session update
    pub const SESSION_UPDATE: u8 = 201;
    /// Session response
    pub const SESSION_RESPONSE: u8 = 202;
    /// Server init request
    pub const SERVER_INIT_REQUEST: u8 = 203;
    /// Server init response
    pub const SERVER_INIT_RESPONSE: u8 = 204;
}

/// SDK version carried by server and session packets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SdkVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch version
    pub patch: u8,
}

impl SdkVersion {
    /// Create a version triple.
    #[must_use]
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            major: r.read_u8("sdk version")?,
            minor: r.read_u8("sdk version")?,
            patch: r.read_u8("sdk version")?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.write_u8(self.major);
        w.write_u8(self.minor);
        w.write_u8(self.patch);
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SdkVersion {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.').map(str::parse::<u8>);
        let invalid = || PacketError::InvalidValue {
            field: "sdk version",
            value: 0,
        };
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch)), None) => {
                Ok(Self::new(major, minor, patch))
            }
            _ => Err(invalid()),
        }
    }
}

macro_rules! signed_packet {
    ($ty:ty) => {
        impl SignedPacket for $ty {
            fn signature(&self) -> &[u8; ED25519_SIGNATURE_SIZE] {
                &self.signature
            }

            fn set_signature(&mut self, signature: [u8; ED25519_SIGNATURE_SIZE]) {
                self.signature = signature;
            }
        }
    };
}

/// Sent once by a game server when it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInitRequest {
    /// Packet version
    pub version: u32,
    /// SDK version of the server
    pub sdk_version: SdkVersion,
    /// Request ID echoed in the response
    pub request_id: u64,
    /// Customer (buyer) ID
    pub customer_id: u64,
    /// Datacenter the server runs in
    pub datacenter_id: u64,
    /// Signature by the customer key
    pub signature: [u8; ED25519_SIGNATURE_SIZE],
}

impl Packet for ServerInitRequest {
    const KIND: &'static str = "server init request";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        Ok(Self {
            version: r.read_version(Self::KIND, Self::MAX_VERSION)?,
            sdk_version: SdkVersion::read(&mut r)?,
            request_id: r.read_u64("request id")?,
            customer_id: r.read_u64("customer id")?,
            datacenter_id: r.read_u64("datacenter id")?,
            signature: r.read_array("signature")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(4 + 3 + 24 + ED25519_SIGNATURE_SIZE);
        w.write_u32(self.version);
        self.sdk_version.write(&mut w);
        w.write_u64(self.request_id);
        w.write_u64(self.customer_id);
        w.write_u64(self.datacenter_id);
        w.write_bytes(&self.signature);
        Ok(w.into_bytes())
    }
}

signed_packet!(ServerInitRequest);

/// Outcome of a server init request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InitResponseCode {
    /// Server accepted
    Ok = 0,
    /// Customer ID not known
    UnknownCustomer = 1,
    /// Datacenter ID not known
    UnknownDatacenter = 2,
    /// SDK version below the supported minimum
    OldSdkVersion = 3,
    /// Signature did not verify
    SignatureCheckFailed = 4,
}

impl TryFrom<u32> for InitResponseCode {
    type Error = PacketError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::UnknownCustomer),
            2 => Ok(Self::UnknownDatacenter),
            3 => Ok(Self::OldSdkVersion),
            4 => Ok(Self::SignatureCheckFailed),
            _ => Err(PacketError::InvalidValue {
                field: "response",
                value: u64::from(value),
            }),
        }
    }
}

/// Backend answer to a server init request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInitResponse {
    /// Packet version
    pub version: u32,
    /// Request ID from the request
    pub request_id: u64,
    /// Outcome
    pub response: InitResponseCode,
    /// Signature by the backend key
    pub signature: [u8; ED25519_SIGNATURE_SIZE],
}

impl Packet for ServerInitResponse {
    const KIND: &'static str = "server init response";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        Ok(Self {
            version: r.read_version(Self::KIND, Self::MAX_VERSION)?,
            request_id: r.read_u64("request id")?,
            response: InitResponseCode::try_from(r.read_u32("response")?)?,
            signature: r.read_array("signature")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(16 + ED25519_SIGNATURE_SIZE);
        w.write_u32(self.version);
        w.write_u64(self.request_id);
        w.write_u32(self.response as u32);
        w.write_bytes(&self.signature);
        Ok(w.into_bytes())
    }
}

signed_packet!(ServerInitResponse);

/// Periodic heartbeat from a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUpdate {
    /// Packet version
    pub version: u32,
    /// Monotonic sequence number
    pub sequence: u64,
    /// SDK version of the server
    pub sdk_version: SdkVersion,
    /// Customer (buyer) ID
    pub customer_id: u64,
    /// Datacenter the server runs in
    pub datacenter_id: u64,
    /// Sessions waiting for a route decision
    pub num_sessions_pending: u32,
    /// Sessions currently accelerated
    pub num_sessions_upgraded: u32,
    /// Server game address
    pub server_address: SocketAddr,
    /// Key relays use to encrypt route tokens for this server
    pub server_route_public_key: [u8; ROUTE_PUBLIC_KEY_SIZE],
    /// Signature by the customer key
    pub signature: [u8; ED25519_SIGNATURE_SIZE],
}

impl Packet for ServerUpdate {
    const KIND: &'static str = "server update";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        Ok(Self {
            version: r.read_version(Self::KIND, Self::MAX_VERSION)?,
            sequence: r.read_u64("sequence")?,
            sdk_version: SdkVersion::read(&mut r)?,
            customer_id: r.read_u64("customer id")?,
            datacenter_id: r.read_u64("datacenter id")?,
            num_sessions_pending: r.read_u32("sessions pending")?,
            num_sessions_upgraded: r.read_u32("sessions upgraded")?,
            server_address: r.read_address("server address", MAX_RELAY_ADDRESS_LENGTH)?,
            server_route_public_key: r.read_array("server route public key")?,
            signature: r.read_array("signature")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(128 + ED25519_SIGNATURE_SIZE);
        w.write_u32(self.version);
        w.write_u64(self.sequence);
        self.sdk_version.write(&mut w);
        w.write_u64(self.customer_id);
        w.write_u64(self.datacenter_id);
        w.write_u32(self.num_sessions_pending);
        w.write_u32(self.num_sessions_upgraded);
        w.write_address("server address", &self.server_address, MAX_RELAY_ADDRESS_LENGTH)?;
        w.write_bytes(&self.server_route_public_key);
        w.write_bytes(&self.signature);
        Ok(w.into_bytes())
    }
}

signed_packet!(ServerUpdate);

/// Latency summary for one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStats {
    /// Minimum round trip time, milliseconds
    pub rtt_min: f32,
    /// Maximum round trip time, milliseconds
    pub rtt_max: f32,
    /// Mean round trip time, milliseconds
    pub rtt_mean: f32,
    /// Jitter, milliseconds
    pub jitter: f32,
    /// Packet loss, percent
    pub packet_loss: f32,
}

impl RouteStats {
    fn read(r: &mut Reader<'_>, field: &'static str) -> Result<Self, PacketError> {
        Ok(Self {
            rtt_min: r.read_f32(field)?,
            rtt_max: r.read_f32(field)?,
            rtt_mean: r.read_f32(field)?,
            jitter: r.read_f32(field)?,
            packet_loss: r.read_f32(field)?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.write_f32(self.rtt_min);
        w.write_f32(self.rtt_max);
        w.write_f32(self.rtt_mean);
        w.write_f32(self.jitter);
        w.write_f32(self.packet_loss);
    }
}

/// Client measurement toward one near relay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NearRelayStats {
    /// Relay ID
    pub relay_id: u64,
    /// Measured path
    pub stats: RouteStats,
}

/// Client network connection type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionType {
    /// Not reported
    #[default]
    Unknown = 0,
    /// Wired ethernet
    Wired = 1,
    /// Wi-Fi
    Wifi = 2,
    /// Cellular
    Cellular = 3,
}

impl TryFrom<u8> for ConnectionType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Wired),
            2 => Ok(Self::Wifi),
            3 => Ok(Self::Cellular),
            _ => Err(PacketError::InvalidValue {
                field: "connection type",
                value: u64::from(value),
            }),
        }
    }
}

/// Periodic report from a live game session, relayed by its server.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    /// Packet version
    pub version: u32,
    /// Monotonic sequence number
    pub sequence: u64,
    /// Customer (buyer) ID
    pub customer_id: u64,
    /// Address of the server hosting the session
    pub server_address: SocketAddr,
    /// Session ID
    pub session_id: u64,
    /// Hashed user identity
    pub user_hash: u64,
    /// Client platform
    pub platform_id: u64,
    /// Customer-defined tag
    pub tag: u64,
    /// Debug flags
    pub flags: u32,
    /// Session flagged by the player
    pub flagged: bool,
    /// Client fell back to direct routing
    pub fallback_to_direct: bool,
    /// Client connection type
    pub connection_type: ConnectionType,
    /// Direct path measurement
    pub direct: RouteStats,
    /// Accelerated path measurement, present while on a route
    pub next: Option<RouteStats>,
    /// Client measurements toward near relays
    pub near_relays: Vec<NearRelayStats>,
    /// Client public address
    pub client_address: SocketAddr,
    /// Key relays use to encrypt route tokens for this client
    pub client_route_public_key: [u8; ROUTE_PUBLIC_KEY_SIZE],
    /// Client upstream bandwidth, kbps
    pub kbps_up: u32,
    /// Client downstream bandwidth, kbps
    pub kbps_down: u32,
    /// Packets lost client to server
    pub packets_lost_client_to_server: u64,
    /// Packets lost server to client
    pub packets_lost_server_to_client: u64,
    /// Customer-defined user flags
    pub user_flags: u64,
    /// Signature by the customer key
    pub signature: [u8; ED25519_SIGNATURE_SIZE],
}

impl Packet for SessionUpdate {
    const KIND: &'static str = "session update";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let version = r.read_version(Self::KIND, Self::MAX_VERSION)?;
        let sequence = r.read_u64("sequence")?;
        let customer_id = r.read_u64("customer id")?;
        let server_address = r.read_address("server address", MAX_RELAY_ADDRESS_LENGTH)?;
        let session_id = r.read_u64("session id")?;
        let user_hash = r.read_u64("user hash")?;
        let platform_id = r.read_u64("platform id")?;
        let tag = r.read_u64("tag")?;
        let flags = r.read_u32("flags")?;
        let flagged = r.read_bool("flagged")?;
        let fallback_to_direct = r.read_bool("fallback to direct")?;
        let connection_type = ConnectionType::try_from(r.read_u8("connection type")?)?;
        let direct = RouteStats::read(&mut r, "direct stats")?;
        let next = if r.read_bool("on next")? {
            Some(RouteStats::read(&mut r, "next stats")?)
        } else {
            None
        };

        let count = r.read_count("near relays", MAX_NEAR_RELAYS)?;
        let mut near_relays = Vec::with_capacity(count);
        for _ in 0..count {
            near_relays.push(NearRelayStats {
                relay_id: r.read_u64("near relay id")?,
                stats: RouteStats::read(&mut r, "near relay stats")?,
            });
        }

        Ok(Self {
            version,
            sequence,
            customer_id,
            server_address,
            session_id,
            user_hash,
            platform_id,
            tag,
            flags,
            flagged,
            fallback_to_direct,
            connection_type,
            direct,
            next,
            near_relays,
            client_address: r.read_address("client address", MAX_RELAY_ADDRESS_LENGTH)?,
            client_route_public_key: r.read_array("client route public key")?,
            kbps_up: r.read_u32("kbps up")?,
            kbps_down: r.read_u32("kbps down")?,
            packets_lost_client_to_server: r.read_u64("packets lost client to server")?,
            packets_lost_server_to_client: r.read_u64("packets lost server to client")?,
            user_flags: r.read_u64("user flags")?,
            signature: r.read_array("signature")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(256 + self.near_relays.len() * 28);
        w.write_u32(self.version);
        w.write_u64(self.sequence);
        w.write_u64(self.customer_id);
        w.write_address("server address", &self.server_address, MAX_RELAY_ADDRESS_LENGTH)?;
        w.write_u64(self.session_id);
        w.write_u64(self.user_hash);
        w.write_u64(self.platform_id);
        w.write_u64(self.tag);
        w.write_u32(self.flags);
        w.write_bool(self.flagged);
        w.write_bool(self.fallback_to_direct);
        w.write_u8(self.connection_type as u8);
        self.direct.write(&mut w);
        w.write_bool(self.next.is_some());
        if let Some(next) = &self.next {
            next.write(&mut w);
        }
        w.write_count("near relays", self.near_relays.len(), MAX_NEAR_RELAYS)?;
        for near in &self.near_relays {
            w.write_u64(near.relay_id);
            near.stats.write(&mut w);
        }
        w.write_address("client address", &self.client_address, MAX_RELAY_ADDRESS_LENGTH)?;
        w.write_bytes(&self.client_route_public_key);
        w.write_u32(self.kbps_up);
        w.write_u32(self.kbps_down);
        w.write_u64(self.packets_lost_client_to_server);
        w.write_u64(self.packets_lost_server_to_client);
        w.write_u64(self.user_flags);
        w.write_bytes(&self.signature);
        Ok(w.into_bytes())
    }
}

signed_packet!(SessionUpdate);

/// A relay the client should measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearRelay {
    /// Relay ID
    pub id: u64,
    /// Relay address
    pub address: SocketAddr,
}

/// Route decision carried by a session response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRoute {
    /// Send game traffic directly to the server
    Direct,
    /// Take a new route through relays
    New {
        /// Send on both direct and relayed paths
        multipath: bool,
        /// Route is committed
        committed: bool,
        /// One token per hop, opaque to the backend
        tokens: Vec<[u8; NEW_ROUTE_TOKEN_SIZE]>,
    },
    /// Keep the current route
    Continue {
        /// Send on both direct and relayed paths
        multipath: bool,
        /// Route is committed
        committed: bool,
        /// One token per hop, opaque to the backend
        tokens: Vec<[u8; CONTINUE_ROUTE_TOKEN_SIZE]>,
    },
}

impl SessionRoute {
    /// Wire discriminant.
    #[must_use]
    pub fn route_type(&self) -> u8 {
        match self {
            Self::Direct => 0,
            Self::New { .. } => 1,
            Self::Continue { .. } => 2,
        }
    }
}

fn read_tokens<const N: usize>(r: &mut Reader<'_>) -> Result<Vec<[u8; N]>, PacketError> {
    let count = r.read_count("route tokens", MAX_ROUTE_TOKENS)?;
    let mut tokens = Vec::with_capacity(count);
    for _ in 0..count {
        tokens.push(r.read_array("route token")?);
    }
    Ok(tokens)
}

fn write_tokens<const N: usize>(
    w: &mut Writer,
    multipath: bool,
    committed: bool,
    tokens: &[[u8; N]],
) -> Result<(), PacketError> {
    w.write_bool(multipath);
    w.write_bool(committed);
    w.write_count("route tokens", tokens.len(), MAX_ROUTE_TOKENS)?;
    for token in tokens {
        w.write_bytes(token);
    }
    Ok(())
}

/// Backend answer to a session update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResponse {
    /// Packet version
    pub version: u32,
    /// Sequence from the update being answered
    pub sequence: u64,
    /// Session ID
    pub session_id: u64,
    /// Relays the client should measure
    pub near_relays: Vec<NearRelay>,
    /// Route decision
    pub route: SessionRoute,
    /// Route key of the hosting server
    pub server_route_public_key: [u8; ROUTE_PUBLIC_KEY_SIZE],
    /// Signature by the backend key
    pub signature: [u8; ED25519_SIGNATURE_SIZE],
}

impl SessionResponse {
    /// Unsigned response steering the session to direct routing.
    #[must_use]
    pub fn direct(
        sequence: u64,
        session_id: u64,
        near_relays: Vec<NearRelay>,
        server_route_public_key: [u8; ROUTE_PUBLIC_KEY_SIZE],
    ) -> Self {
        Self {
            version: Self::MAX_VERSION,
            sequence,
            session_id,
            near_relays,
            route: SessionRoute::Direct,
            server_route_public_key,
            signature: [0u8; ED25519_SIGNATURE_SIZE],
        }
    }
}

impl Packet for SessionResponse {
    const KIND: &'static str = "session response";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let version = r.read_version(Self::KIND, Self::MAX_VERSION)?;
        let sequence = r.read_u64("sequence")?;
        let session_id = r.read_u64("session id")?;

        let count = r.read_count("near relays", MAX_NEAR_RELAYS)?;
        let mut near_relays = Vec::with_capacity(count);
        for _ in 0..count {
            near_relays.push(NearRelay {
                id: r.read_u64("near relay id")?,
                address: r.read_address("near relay address", MAX_RELAY_ADDRESS_LENGTH)?,
            });
        }

        let route = match r.read_u8("route type")? {
            0 => SessionRoute::Direct,
            1 => SessionRoute::New {
                multipath: r.read_bool("multipath")?,
                committed: r.read_bool("committed")?,
                tokens: read_tokens(&mut r)?,
            },
            2 => SessionRoute::Continue {
                multipath: r.read_bool("multipath")?,
                committed: r.read_bool("committed")?,
                tokens: read_tokens(&mut r)?,
            },
            other => {
                return Err(PacketError::InvalidValue {
                    field: "route type",
                    value: u64::from(other),
                });
            }
        };

        Ok(Self {
            version,
            sequence,
            session_id,
            near_relays,
            route,
            server_route_public_key: r.read_array("server route public key")?,
            signature: r.read_array("signature")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(256 + self.near_relays.len() * 32);
        w.write_u32(self.version);
        w.write_u64(self.sequence);
        w.write_u64(self.session_id);
        w.write_count("near relays", self.near_relays.len(), MAX_NEAR_RELAYS)?;
        for near in &self.near_relays {
            w.write_u64(near.id);
            w.write_address("near relay address", &near.address, MAX_RELAY_ADDRESS_LENGTH)?;
        }
        w.write_u8(self.route.route_type());
        match &self.route {
            SessionRoute::Direct => {}
            SessionRoute::New {
                multipath,
                committed,
                tokens,
            } => write_tokens(&mut w, *multipath, *committed, tokens)?,
            SessionRoute::Continue {
                multipath,
                committed,
                tokens,
            } => write_tokens(&mut w, *multipath, *committed, tokens)?,
        }
        w.write_bytes(&self.server_route_public_key);
        w.write_bytes(&self.signature);
        Ok(w.into_bytes())
    }
}

signed_packet!(SessionResponse);

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;
    use relaynet_crypto::signatures::SigningKey;

    fn server_update() -> ServerUpdate {
        ServerUpdate {
            version: 0,
            sequence: 7,
            sdk_version: SdkVersion::new(4, 0, 2),
            customer_id: 0xabcd,
            datacenter_id: 99,
            num_sessions_pending: 3,
            num_sessions_upgraded: 1,
            server_address: "203.0.113.5:30000".parse().unwrap(),
            server_route_public_key: [4u8; 32],
            signature: [0u8; 64],
        }
    }

    fn session_update() -> SessionUpdate {
        SessionUpdate {
            version: 0,
            sequence: 1,
            customer_id: 0xabcd,
            server_address: "203.0.113.5:30000".parse().unwrap(),
            session_id: 0x1234,
            user_hash: 5,
            platform_id: 1,
            tag: 0,
            flags: 0,
            flagged: false,
            fallback_to_direct: false,
            connection_type: ConnectionType::Wifi,
            direct: RouteStats {
                rtt_min: 40.0,
                rtt_max: 60.0,
                rtt_mean: 50.0,
                jitter: 2.0,
                packet_loss: 0.0,
            },
            next: None,
            near_relays: vec![NearRelayStats {
                relay_id: 77,
                stats: RouteStats::default(),
            }],
            client_address: "198.51.100.2:5000".parse().unwrap(),
            client_route_public_key: [8u8; 32],
            kbps_up: 100,
            kbps_down: 200,
            packets_lost_client_to_server: 0,
            packets_lost_server_to_client: 2,
            user_flags: 0,
            signature: [0u8; 64],
        }
    }

    #[test]
    fn test_sdk_version_ordering_and_parse() {
        assert!(SdkVersion::new(4, 0, 0) > SdkVersion::new(3, 9, 9));
        assert!(SdkVersion::new(4, 1, 0) > SdkVersion::new(4, 0, 9));
        assert_eq!("4.0.2".parse::<SdkVersion>().unwrap(), SdkVersion::new(4, 0, 2));
        assert_eq!(SdkVersion::new(4, 0, 2).to_string(), "4.0.2");
        assert!("4.0".parse::<SdkVersion>().is_err());
        assert!("4.0.256".parse::<SdkVersion>().is_err());
    }

    #[test]
    fn test_server_init_roundtrip() {
        let request = ServerInitRequest {
            version: 0,
            sdk_version: SdkVersion::new(4, 0, 0),
            request_id: 1,
            customer_id: 2,
            datacenter_id: 3,
            signature: [6u8; 64],
        };
        let bytes = request.encode().unwrap();
        assert_eq!(ServerInitRequest::decode(&bytes).unwrap(), request);

        let response = ServerInitResponse {
            version: 0,
            request_id: 1,
            response: InitResponseCode::OldSdkVersion,
            signature: [1u8; 64],
        };
        let bytes = response.encode().unwrap();
        assert_eq!(ServerInitResponse::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn test_server_init_response_unknown_code() {
        let mut bytes = ServerInitResponse {
            version: 0,
            request_id: 1,
            response: InitResponseCode::Ok,
            signature: [0u8; 64],
        }
        .encode()
        .unwrap();
        bytes[12] = 9;
        assert_eq!(
            ServerInitResponse::decode(&bytes),
            Err(PacketError::InvalidValue {
                field: "response",
                value: 9
            })
        );
    }

    #[test]
    fn test_server_update_sign_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let mut update = server_update();
        update.sign(&key).unwrap();

        let decoded = ServerUpdate::decode(&update.encode().unwrap()).unwrap();
        assert_eq!(decoded, update);
        assert!(decoded.verify(&key.verifying_key().to_bytes()).is_ok());
    }

    #[test]
    fn test_sign_data_excludes_signature() {
        let mut update = server_update();
        let before = update.sign_data().unwrap();
        update.signature = [0xff; 64];
        assert_eq!(update.sign_data().unwrap(), before);
        assert_eq!(before.len() + 64, update.encode().unwrap().len());
    }

    #[test]
    fn test_tampered_field_fails_verification() {
        let key = SigningKey::generate(&mut OsRng);
        let mut update = server_update();
        update.sign(&key).unwrap();
        update.num_sessions_upgraded += 1;
        assert!(update.verify(&key.verifying_key().to_bytes()).is_err());
    }

    #[test]
    fn test_session_update_roundtrip_with_and_without_next() {
        let mut update = session_update();
        let bytes = update.encode().unwrap();
        assert_eq!(SessionUpdate::decode(&bytes).unwrap(), update);

        update.next = Some(RouteStats {
            rtt_min: 20.0,
            rtt_max: 25.0,
            rtt_mean: 22.0,
            jitter: 1.0,
            packet_loss: 0.0,
        });
        let with_next = update.encode().unwrap();
        assert_eq!(with_next.len(), bytes.len() + 20);
        assert_eq!(SessionUpdate::decode(&with_next).unwrap(), update);
    }

    #[test]
    fn test_session_update_too_many_near_relays() {
        let mut update = session_update();
        update.near_relays = vec![NearRelayStats::default(); MAX_NEAR_RELAYS + 1];
        assert!(matches!(
            update.encode(),
            Err(PacketError::CountTooLarge {
                field: "near relays",
                ..
            })
        ));
    }

    #[test]
    fn test_session_update_bad_connection_type() {
        let mut bytes = session_update().encode().unwrap();
        // version, sequence, customer, server address, session, user hash,
        // platform, tag, flags, flagged, fallback
        let offset = 4 + 8 + 8 + 4 + 17 + 8 + 8 + 8 + 8 + 4 + 1 + 1;
        bytes[offset] = 42;
        assert_eq!(
            SessionUpdate::decode(&bytes),
            Err(PacketError::InvalidValue {
                field: "connection type",
                value: 42
            })
        );
    }

    #[test]
    fn test_session_response_routes_roundtrip() {
        let near = vec![NearRelay {
            id: 1,
            address: "10.0.0.1:40000".parse().unwrap(),
        }];
        let routes = [
            SessionRoute::Direct,
            SessionRoute::New {
                multipath: true,
                committed: false,
                tokens: vec![[1u8; NEW_ROUTE_TOKEN_SIZE]; 3],
            },
            SessionRoute::Continue {
                multipath: false,
                committed: true,
                tokens: vec![[2u8; CONTINUE_ROUTE_TOKEN_SIZE]; MAX_ROUTE_TOKENS],
            },
        ];
        for route in routes {
            let response = SessionResponse {
                route,
                ..SessionResponse::direct(9, 10, near.clone(), [3u8; 32])
            };
            let bytes = response.encode().unwrap();
            assert_eq!(SessionResponse::decode(&bytes).unwrap(), response);
        }
    }

    #[test]
    fn test_session_response_too_many_tokens() {
        let response = SessionResponse {
            route: SessionRoute::New {
                multipath: false,
                committed: false,
                tokens: vec![[0u8; NEW_ROUTE_TOKEN_SIZE]; MAX_ROUTE_TOKENS + 1],
            },
            ..SessionResponse::direct(1, 1, Vec::new(), [0u8; 32])
        };
        assert!(response.encode().is_err());
    }
}
