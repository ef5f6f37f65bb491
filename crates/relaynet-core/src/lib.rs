//! # relaynet Core
//!
//! Wire packets exchanged between relays, game servers, sessions and the
//! relaynet backend.
//!
//! This crate provides:
//! - A strict little-endian codec with per-field bounds
//! - Relay init and update packets (binary and JSON forms)
//! - Versioned relay traffic counters
//! - Signed server init, server update, session update and session response
//!   packets
//!
//! ## Decoding guarantees
//!
//! - A version above the supported maximum is rejected before any other field
//! - A short buffer fails with the name of the first field that could not be read
//! - String lengths and array counts are bounded before anything is allocated
//! - Addresses must parse as `ip:port`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod json;
pub mod packets;
pub mod traffic;

pub use error::PacketError;
pub use packets::relay::{
    RelayInitRequest, RelayInitResponse, RelayPingStats, RelayPingTarget, RelayUpdateRequest,
    RelayUpdateResponse,
};
pub use packets::server::{
    ConnectionType, InitResponseCode, NearRelay, NearRelayStats, RouteStats, SdkVersion,
    ServerInitRequest, ServerInitResponse, ServerUpdate, SessionResponse, SessionRoute,
    SessionUpdate,
};
pub use packets::{Packet, SignedPacket};
pub use traffic::TrafficStats;

/// Magic value leading every relay init request
pub const INIT_REQUEST_MAGIC: u32 = 0x9083_708f;

/// Maximum relays in the fleet, and in any relay list on the wire
pub const MAX_RELAYS: usize = 1024;

/// Maximum length of an address string
pub const MAX_RELAY_ADDRESS_LENGTH: usize = 256;

/// Maximum length of a relay name
pub const MAX_RELAY_ID_LENGTH: usize = 256;

/// Maximum length of a relay software version string
pub const MAX_RELAY_VERSION_LENGTH: usize = 32;

/// Maximum near relays in a session packet
pub const MAX_NEAR_RELAYS: usize = 32;

/// Maximum route tokens in a session response
pub const MAX_ROUTE_TOKENS: usize = 7;

/// Relay X25519 public key size
pub const RELAY_PUBLIC_KEY_SIZE: usize = relaynet_crypto::X25519_PUBLIC_KEY_SIZE;

/// Server and client route key size
pub const ROUTE_PUBLIC_KEY_SIZE: usize = 32;

/// Encrypted new-route token size
pub const NEW_ROUTE_TOKEN_SIZE: usize = 111;

/// Encrypted continue-route token size
pub const CONTINUE_ROUTE_TOKEN_SIZE: usize = 57;
