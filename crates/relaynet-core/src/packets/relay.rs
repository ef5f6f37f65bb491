//! Relay init and update packets.
//!
//! | Packet | Layout |
//! |--------|--------|
//! | init request | magic, version, nonce, address, encrypted token |
//! | init response | version, timestamp, public key |
//! | update request | version, address, token, ping stats, traffic stats, shutdown flag, cpu, memory, relay version |
//! | update response | version, timestamp, relays to ping |

use super::Packet;
use crate::codec::{Reader, Writer, check_version};
use crate::error::PacketError;
use crate::traffic::TrafficStats;
use crate::{
    MAX_RELAY_ADDRESS_LENGTH, MAX_RELAY_VERSION_LENGTH, MAX_RELAYS, RELAY_PUBLIC_KEY_SIZE,
};
use relaynet_crypto::{SEALED_TOKEN_SIZE, XCHACHA_NONCE_SIZE};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Relay init request, sent once when a relay process starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInitRequest {
    /// Request protection magic, checked by the handler
    pub magic: u32,
    /// Packet version
    pub version: u32,
    /// Nonce the token was sealed with
    pub nonce: [u8; XCHACHA_NONCE_SIZE],
    /// Public address the relay listens on
    pub address: SocketAddr,
    /// Random token sealed to the backend
    pub encrypted_token: [u8; SEALED_TOKEN_SIZE],
}

impl Packet for RelayInitRequest {
    const KIND: &'static str = "relay init request";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let magic = r.read_u32("magic")?;
        let version = r.read_version(Self::KIND, Self::MAX_VERSION)?;
        Ok(Self {
            magic,
            version,
            nonce: r.read_array("nonce")?,
            address: r.read_address("relay address", MAX_RELAY_ADDRESS_LENGTH)?,
            encrypted_token: r.read_array("encrypted token")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(128);
        w.write_u32(self.magic);
        w.write_u32(self.version);
        w.write_bytes(&self.nonce);
        w.write_address("relay address", &self.address, MAX_RELAY_ADDRESS_LENGTH)?;
        w.write_bytes(&self.encrypted_token);
        Ok(w.into_bytes())
    }
}

/// Relay init response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInitResponse {
    /// Packet version
    pub version: u32,
    /// Backend time, unix seconds (milliseconds on the JSON path)
    pub timestamp: u64,
    /// The relay's registered public key
    pub public_key: [u8; RELAY_PUBLIC_KEY_SIZE],
}

impl Packet for RelayInitResponse {
    const KIND: &'static str = "relay init response";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        Ok(Self {
            version: r.read_version(Self::KIND, Self::MAX_VERSION)?,
            timestamp: r.read_u64("timestamp")?,
            public_key: r.read_array("public key")?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(4 + 8 + RELAY_PUBLIC_KEY_SIZE);
        w.write_u32(self.version);
        w.write_u64(self.timestamp);
        w.write_bytes(&self.public_key);
        Ok(w.into_bytes())
    }
}

/// One measurement a relay reports about a peer it pinged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayPingStats {
    /// Peer relay ID
    pub relay_id: u64,
    /// Round trip time, milliseconds
    pub rtt: f32,
    /// Jitter, milliseconds
    pub jitter: f32,
    /// Packet loss, percent
    pub packet_loss: f32,
}

/// Relay update request, sent periodically by every live relay.
///
/// `version` selects the traffic stats layout: version 0 carries only the
/// session count and byte totals, version 1 the per-packet-type counters.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayUpdateRequest {
    /// Packet version
    pub version: u32,
    /// Public address the relay listens on
    pub address: SocketAddr,
    /// Relay public key, proving the relay went through init
    pub token: [u8; RELAY_PUBLIC_KEY_SIZE],
    /// Measurements from the previous round of pings
    pub ping_stats: Vec<RelayPingStats>,
    /// Traffic counters
    pub traffic_stats: TrafficStats,
    /// Relay is leaving the mesh
    pub shutting_down: bool,
    /// CPU usage, percent
    pub cpu_usage: f64,
    /// Memory usage, percent
    pub mem_usage: f64,
    /// Relay software version
    pub relay_version: String,
}

impl Packet for RelayUpdateRequest {
    const KIND: &'static str = "relay update request";
    const MAX_VERSION: u32 = 1;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let version = r.read_version(Self::KIND, Self::MAX_VERSION)?;
        let address = r.read_address("relay address", MAX_RELAY_ADDRESS_LENGTH)?;
        let token = r.read_array("token")?;

        let count = r.read_count("ping stats", MAX_RELAYS)?;
        let mut ping_stats = Vec::with_capacity(count);
        for _ in 0..count {
            ping_stats.push(RelayPingStats {
                relay_id: r.read_u64("a ping stat")?,
                rtt: r.read_f32("a ping stat")?,
                jitter: r.read_f32("a ping stat")?,
                packet_loss: r.read_f32("a ping stat")?,
            });
        }

        Ok(Self {
            version,
            address,
            token,
            ping_stats,
            traffic_stats: TrafficStats::read(&mut r, version)?,
            shutting_down: r.read_bool("shutdown flag")?,
            cpu_usage: r.read_f64("cpu usage")?,
            mem_usage: r.read_f64("memory usage")?,
            relay_version: r.read_string("relay version", MAX_RELAY_VERSION_LENGTH)?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(
            128 + self.ping_stats.len() * 20 + TrafficStats::encoded_len(self.version),
        );
        w.write_u32(self.version);
        w.write_address("relay address", &self.address, MAX_RELAY_ADDRESS_LENGTH)?;
        w.write_bytes(&self.token);
        w.write_count("ping stats", self.ping_stats.len(), MAX_RELAYS)?;
        for stats in &self.ping_stats {
            w.write_u64(stats.relay_id);
            w.write_f32(stats.rtt);
            w.write_f32(stats.jitter);
            w.write_f32(stats.packet_loss);
        }
        self.traffic_stats.write(&mut w, self.version)?;
        w.write_bool(self.shutting_down);
        w.write_f64(self.cpu_usage);
        w.write_f64(self.mem_usage);
        w.write_string("relay version", &self.relay_version, MAX_RELAY_VERSION_LENGTH)?;
        Ok(w.into_bytes())
    }
}

/// A peer the requesting relay should ping next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPingTarget {
    /// Peer relay ID
    pub id: u64,
    /// Address to ping the peer on
    pub address: SocketAddr,
}

/// Relay update response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayUpdateResponse {
    /// Packet version
    pub version: u32,
    /// Backend time, unix seconds
    pub timestamp: u64,
    /// Peers to ping until the next update
    pub relays_to_ping: Vec<RelayPingTarget>,
}

impl Packet for RelayUpdateResponse {
    const KIND: &'static str = "relay update response";
    const MAX_VERSION: u32 = 0;

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let version = r.read_version(Self::KIND, Self::MAX_VERSION)?;
        let timestamp = r.read_u64("timestamp")?;
        let count = r.read_count("relays to ping", MAX_RELAYS)?;
        let mut relays_to_ping = Vec::with_capacity(count);
        for _ in 0..count {
            relays_to_ping.push(RelayPingTarget {
                id: r.read_u64("relay id")?,
                address: r.read_address("relay address", MAX_RELAY_ADDRESS_LENGTH)?,
            });
        }
        Ok(Self {
            version,
            timestamp,
            relays_to_ping,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        let mut w = Writer::with_capacity(16 + self.relays_to_ping.len() * 32);
        w.write_u32(self.version);
        w.write_u64(self.timestamp);
        w.write_count("relays to ping", self.relays_to_ping.len(), MAX_RELAYS)?;
        for target in &self.relays_to_ping {
            w.write_u64(target.id);
            w.write_address("relay address", &target.address, MAX_RELAY_ADDRESS_LENGTH)?;
        }
        Ok(w.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INIT_REQUEST_MAGIC;

    fn init_request() -> RelayInitRequest {
        RelayInitRequest {
            magic: INIT_REQUEST_MAGIC,
            version: 0,
            nonce: [3u8; XCHACHA_NONCE_SIZE],
            address: "127.0.0.1:40000".parse().unwrap(),
            encrypted_token: [9u8; SEALED_TOKEN_SIZE],
        }
    }

    fn update_request(version: u32) -> RelayUpdateRequest {
        RelayUpdateRequest {
            version,
            address: "10.1.2.3:40000".parse().unwrap(),
            token: [5u8; RELAY_PUBLIC_KEY_SIZE],
            ping_stats: vec![
                RelayPingStats {
                    relay_id: 11,
                    rtt: 12.5,
                    jitter: 0.5,
                    packet_loss: 0.0,
                },
                RelayPingStats {
                    relay_id: 22,
                    rtt: 80.0,
                    jitter: 3.0,
                    packet_loss: 1.5,
                },
            ],
            traffic_stats: TrafficStats {
                session_count: 4,
                ..TrafficStats::default()
            },
            shutting_down: false,
            cpu_usage: 12.0,
            mem_usage: 40.0,
            relay_version: "2.1.0".to_string(),
        }
    }

    #[test]
    fn test_init_request_roundtrip() {
        let request = init_request();
        let bytes = request.encode().unwrap();
        assert_eq!(bytes.len(), 4 + 4 + 24 + 4 + 15 + 48);
        assert_eq!(RelayInitRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_init_request_bad_address() {
        let mut w = Writer::new();
        w.write_u32(INIT_REQUEST_MAGIC);
        w.write_u32(0);
        w.write_bytes(&[0u8; XCHACHA_NONCE_SIZE]);
        w.write_string("relay address", "relay.example", 256).unwrap();
        w.write_bytes(&[0u8; SEALED_TOKEN_SIZE]);

        assert!(matches!(
            RelayInitRequest::decode(&w.into_bytes()),
            Err(PacketError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_init_request_future_version() {
        let mut request = init_request();
        request.version = 1;
        assert!(matches!(
            request.encode(),
            Err(PacketError::UnsupportedVersion { version: 1, .. })
        ));

        let mut bytes = init_request().encode().unwrap();
        bytes[4] = 1;
        assert!(matches!(
            RelayInitRequest::decode(&bytes),
            Err(PacketError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_init_response_roundtrip() {
        let response = RelayInitResponse {
            version: 0,
            timestamp: 1_700_000_000,
            public_key: [1u8; 32],
        };
        let bytes = response.encode().unwrap();
        assert_eq!(bytes.len(), 44);
        assert_eq!(RelayInitResponse::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn test_update_request_roundtrip_both_versions() {
        for version in 0..=1 {
            let request = update_request(version);
            let bytes = request.encode().unwrap();
            assert_eq!(RelayUpdateRequest::decode(&bytes).unwrap(), request);
        }
    }

    #[test]
    fn test_update_request_truncation_messages() {
        let bytes = update_request(0).encode().unwrap();
        let traffic_start = bytes.len() - (8 * 3 + 1 + 8 + 8 + 4 + 5);

        let cases = [
            (traffic_start + 4, "invalid packet, could not read session count"),
            (traffic_start + 8 + 2, "invalid packet, could not read bytes sent"),
            (traffic_start + 24, "invalid packet, could not read shutdown flag"),
            (traffic_start + 25, "invalid packet, could not read cpu usage"),
            (traffic_start + 33, "invalid packet, could not read memory usage"),
            (traffic_start + 41, "invalid packet, could not read relay version"),
        ];
        for (len, message) in cases {
            let err = RelayUpdateRequest::decode(&bytes[..len]).unwrap_err();
            assert_eq!(err.to_string(), message, "truncated at {len}");
        }
    }

    #[test]
    fn test_update_request_too_many_ping_stats() {
        let mut w = Writer::new();
        w.write_u32(0);
        w.write_string("relay address", "10.0.0.1:1", 256).unwrap();
        w.write_bytes(&[0u8; 32]);
        w.write_u32((MAX_RELAYS + 1) as u32);

        assert_eq!(
            RelayUpdateRequest::decode(&w.into_bytes()),
            Err(PacketError::CountTooLarge {
                field: "ping stats",
                count: MAX_RELAYS + 1,
                max: MAX_RELAYS
            })
        );
    }

    #[test]
    fn test_update_request_encode_refuses_oversized_ping_stats() {
        let mut request = update_request(1);
        request.ping_stats = vec![RelayPingStats::default(); MAX_RELAYS + 1];
        assert!(matches!(
            request.encode(),
            Err(PacketError::CountTooLarge { .. })
        ));
    }

    #[test]
    fn test_update_request_relay_version_too_long() {
        let mut request = update_request(0);
        request.relay_version = "v".repeat(MAX_RELAY_VERSION_LENGTH + 1);
        assert!(request.encode().is_err());
    }

    #[test]
    fn test_update_response_roundtrip() {
        let response = RelayUpdateResponse {
            version: 0,
            timestamp: 42,
            relays_to_ping: vec![
                RelayPingTarget {
                    id: 1,
                    address: "10.0.0.1:40000".parse().unwrap(),
                },
                RelayPingTarget {
                    id: 2,
                    address: "[::1]:40000".parse().unwrap(),
                },
            ],
        };
        let bytes = response.encode().unwrap();
        assert_eq!(RelayUpdateResponse::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn test_update_response_empty() {
        let response = RelayUpdateResponse {
            version: 0,
            timestamp: 42,
            relays_to_ping: Vec::new(),
        };
        let bytes = response.encode().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(RelayUpdateResponse::decode(&bytes).unwrap(), response);
    }
}
