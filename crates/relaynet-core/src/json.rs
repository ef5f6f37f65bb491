//! JSON forms of the relay packets.
//!
//! Served on the same endpoints as the binary forms when the request carries
//! `application/json`. Byte fields are standard base64. Conversion into the
//! packet types applies the same version, length and address checks as the
//! binary decoder.

use crate::codec::{check_version, parse_address};
use crate::error::PacketError;
use crate::packets::Packet;
use crate::packets::relay::{
    RelayInitRequest, RelayInitResponse, RelayPingStats, RelayPingTarget, RelayUpdateRequest,
    RelayUpdateResponse,
};
use crate::traffic::TrafficStats;
use crate::{MAX_RELAY_ADDRESS_LENGTH, MAX_RELAY_VERSION_LENGTH, MAX_RELAYS};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::{IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;

fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], PacketError> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| PacketError::Json(format!("{field}: {e}")))?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| PacketError::InvalidLength {
        field,
        expected: N,
        actual,
    })
}

fn checked_address(field: &'static str, value: &str) -> Result<std::net::SocketAddr, PacketError> {
    if value.len() > MAX_RELAY_ADDRESS_LENGTH {
        return Err(PacketError::StringTooLong {
            field,
            len: value.len(),
            max: MAX_RELAY_ADDRESS_LENGTH,
        });
    }
    parse_address(field, value)
}

/// Reads a per-relay array, keeping at most `MAX_RELAYS + 1` elements.
///
/// Elements past that are parsed and discarded, so a hostile body cannot
/// grow the allocation. The caller's count check then rejects the list.
fn relay_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct RelayListVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for RelayListVisitor<T> {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an array of relay entries")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<T>, A::Error> {
            let hint = seq.size_hint().unwrap_or(0).min(MAX_RELAYS + 1);
            let mut items = Vec::with_capacity(hint);
            while items.len() <= MAX_RELAYS {
                match seq.next_element()? {
                    Some(item) => items.push(item),
                    None => return Ok(items),
                }
            }
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(items)
        }
    }

    deserializer.deserialize_seq(RelayListVisitor(PhantomData))
}

#[derive(Debug, Serialize, Deserialize)]
struct InitRequestJson {
    magic_request_protection: u32,
    version: u32,
    nonce: String,
    relay_address: String,
    encrypted_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InitResponseJson {
    version: u32,
    timestamp: u64,
    public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateRequestJson {
    version: u32,
    relay_address: String,
    token: String,
    #[serde(default, deserialize_with = "relay_list")]
    ping_stats: Vec<RelayPingStats>,
    #[serde(default)]
    traffic_stats: TrafficStats,
    #[serde(default)]
    shutting_down: bool,
    #[serde(default)]
    cpu_usage: f64,
    #[serde(default)]
    mem_usage: f64,
    #[serde(default)]
    relay_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PingTargetJson {
    id: u64,
    address: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateResponseJson {
    version: u32,
    timestamp: u64,
    #[serde(deserialize_with = "relay_list")]
    ping_data: Vec<PingTargetJson>,
}

impl RelayInitRequest {
    /// Parse the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for malformed JSON or any field the binary
    /// decoder would also reject.
    pub fn from_json(data: &[u8]) -> Result<Self, PacketError> {
        let doc: InitRequestJson = serde_json::from_slice(data)?;
        check_version(Self::KIND, doc.version, Self::MAX_VERSION)?;
        Ok(Self {
            magic: doc.magic_request_protection,
            version: doc.version,
            nonce: decode_fixed("nonce", &doc.nonce)?,
            address: checked_address("relay address", &doc.relay_address)?,
            encrypted_token: decode_fixed("encrypted token", &doc.encrypted_token)?,
        })
    }

    /// Render the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if the packet violates a codec bound.
    pub fn to_json(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        Ok(serde_json::to_vec(&InitRequestJson {
            magic_request_protection: self.magic,
            version: self.version,
            nonce: STANDARD.encode(self.nonce),
            relay_address: self.address.to_string(),
            encrypted_token: STANDARD.encode(self.encrypted_token),
        })?)
    }
}

impl RelayInitResponse {
    /// Parse the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for malformed JSON or a bad key length.
    pub fn from_json(data: &[u8]) -> Result<Self, PacketError> {
        let doc: InitResponseJson = serde_json::from_slice(data)?;
        check_version(Self::KIND, doc.version, Self::MAX_VERSION)?;
        Ok(Self {
            version: doc.version,
            timestamp: doc.timestamp,
            public_key: decode_fixed("public key", &doc.public_key)?,
        })
    }

    /// Render the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for an unsupported version.
    pub fn to_json(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        Ok(serde_json::to_vec(&InitResponseJson {
            version: self.version,
            timestamp: self.timestamp,
            public_key: STANDARD.encode(self.public_key),
        })?)
    }
}

impl RelayUpdateRequest {
    /// Parse the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for malformed JSON or any field the binary
    /// decoder would also reject.
    pub fn from_json(data: &[u8]) -> Result<Self, PacketError> {
        let doc: UpdateRequestJson = serde_json::from_slice(data)?;
        check_version(Self::KIND, doc.version, Self::MAX_VERSION)?;
        if doc.ping_stats.len() > MAX_RELAYS {
            return Err(PacketError::CountTooLarge {
                field: "ping stats",
                count: doc.ping_stats.len(),
                max: MAX_RELAYS,
            });
        }
        if doc.relay_version.len() > MAX_RELAY_VERSION_LENGTH {
            return Err(PacketError::StringTooLong {
                field: "relay version",
                len: doc.relay_version.len(),
                max: MAX_RELAY_VERSION_LENGTH,
            });
        }
        Ok(Self {
            version: doc.version,
            address: checked_address("relay address", &doc.relay_address)?,
            token: decode_fixed("token", &doc.token)?,
            ping_stats: doc.ping_stats,
            traffic_stats: doc.traffic_stats.for_version(doc.version),
            shutting_down: doc.shutting_down,
            cpu_usage: doc.cpu_usage,
            mem_usage: doc.mem_usage,
            relay_version: doc.relay_version,
        })
    }

    /// Render the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if the packet violates a codec bound.
    pub fn to_json(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        self.traffic_stats.check_layout(self.version)?;
        if self.ping_stats.len() > MAX_RELAYS {
            return Err(PacketError::CountTooLarge {
                field: "ping stats",
                count: self.ping_stats.len(),
                max: MAX_RELAYS,
            });
        }
        Ok(serde_json::to_vec(&UpdateRequestJson {
            version: self.version,
            relay_address: self.address.to_string(),
            token: STANDARD.encode(self.token),
            ping_stats: self.ping_stats.clone(),
            traffic_stats: self.traffic_stats,
            shutting_down: self.shutting_down,
            cpu_usage: self.cpu_usage,
            mem_usage: self.mem_usage,
            relay_version: self.relay_version.clone(),
        })?)
    }
}

impl RelayUpdateResponse {
    /// Parse the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for malformed JSON or a bad address.
    pub fn from_json(data: &[u8]) -> Result<Self, PacketError> {
        let doc: UpdateResponseJson = serde_json::from_slice(data)?;
        check_version(Self::KIND, doc.version, Self::MAX_VERSION)?;
        if doc.ping_data.len() > MAX_RELAYS {
            return Err(PacketError::CountTooLarge {
                field: "relays to ping",
                count: doc.ping_data.len(),
                max: MAX_RELAYS,
            });
        }
        let relays_to_ping = doc
            .ping_data
            .iter()
            .map(|target| {
                Ok(RelayPingTarget {
                    id: target.id,
                    address: checked_address("relay address", &target.address)?,
                })
            })
            .collect::<Result<Vec<_>, PacketError>>()?;
        Ok(Self {
            version: doc.version,
            timestamp: doc.timestamp,
            relays_to_ping,
        })
    }

    /// Render the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for an unsupported version.
    pub fn to_json(&self) -> Result<Vec<u8>, PacketError> {
        check_version(Self::KIND, self.version, Self::MAX_VERSION)?;
        Ok(serde_json::to_vec(&UpdateResponseJson {
            version: self.version,
            timestamp: self.timestamp,
            ping_data: self
                .relays_to_ping
                .iter()
                .map(|target| PingTargetJson {
                    id: target.id,
                    address: target.address.to_string(),
                })
                .collect(),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INIT_REQUEST_MAGIC;

    #[test]
    fn test_init_request_json_matches_binary() {
        let request = RelayInitRequest {
            magic: INIT_REQUEST_MAGIC,
            version: 0,
            nonce: [1u8; 24],
            address: "127.0.0.1:40000".parse().unwrap(),
            encrypted_token: [2u8; 48],
        };
        let json = request.to_json().unwrap();
        assert_eq!(RelayInitRequest::from_json(&json).unwrap(), request);
        assert_eq!(
            RelayInitRequest::decode(&request.encode().unwrap()).unwrap(),
            RelayInitRequest::from_json(&json).unwrap()
        );
    }

    #[test]
    fn test_init_request_json_wrong_token_length() {
        let json = format!(
            r#"{{"magic_request_protection":{INIT_REQUEST_MAGIC},"version":0,"nonce":"{}","relay_address":"127.0.0.1:40000","encrypted_token":"{}"}}"#,
            STANDARD.encode([0u8; 24]),
            STANDARD.encode([0u8; 47])
        );
        assert_eq!(
            RelayInitRequest::from_json(json.as_bytes()),
            Err(PacketError::InvalidLength {
                field: "encrypted token",
                expected: 48,
                actual: 47
            })
        );
    }

    #[test]
    fn test_init_request_json_bad_address() {
        let json = format!(
            r#"{{"magic_request_protection":0,"version":0,"nonce":"{}","relay_address":"nowhere","encrypted_token":"{}"}}"#,
            STANDARD.encode([0u8; 24]),
            STANDARD.encode([0u8; 48])
        );
        assert!(matches!(
            RelayInitRequest::from_json(json.as_bytes()),
            Err(PacketError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_update_request_json_roundtrip() {
        let request = RelayUpdateRequest {
            version: 1,
            address: "10.0.0.9:40000".parse().unwrap(),
            token: [7u8; 32],
            ping_stats: vec![RelayPingStats {
                relay_id: 3,
                rtt: 10.0,
                jitter: 1.0,
                packet_loss: 0.0,
            }],
            traffic_stats: TrafficStats {
                pong_rx: 3,
                ..TrafficStats::default()
            },
            shutting_down: true,
            cpu_usage: 1.0,
            mem_usage: 2.0,
            relay_version: "1.0.0".to_string(),
        };
        let json = request.to_json().unwrap();
        assert_eq!(RelayUpdateRequest::from_json(&json).unwrap(), request);
    }

    fn update_json(version: u32, ping_stats: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "version": version,
            "relay_address": "10.0.0.9:40000",
            "token": STANDARD.encode([7u8; 32]),
            "ping_stats": ping_stats,
            "traffic_stats": {
                "session_count": 3,
                "pong_rx": 77,
                "near_ping_tx": 5,
                "bytes_sent": 99,
                "bytes_received": 11
            },
            "shutting_down": false,
            "cpu_usage": 1.0,
            "mem_usage": 2.0,
            "relay_version": "1.0.0"
        }))
        .unwrap()
    }

    #[test]
    fn test_update_request_json_matches_binary_layout() {
        let stats = TrafficStats {
            session_count: 3,
            pong_rx: 77,
            near_ping_tx: 5,
            bytes_sent: 99,
            bytes_received: 11,
            ..TrafficStats::default()
        };
        let pings = serde_json::json!([{ "relay_id": 4, "rtt": 10.0, "jitter": 1.0, "packet_loss": 0.0 }]);

        for version in 0..=RelayUpdateRequest::MAX_VERSION {
            let from_json = RelayUpdateRequest::from_json(&update_json(version, &pings)).unwrap();

            let mut binary = from_json.clone();
            binary.traffic_stats = stats.for_version(version);
            let from_binary = RelayUpdateRequest::decode(&binary.encode().unwrap()).unwrap();

            assert_eq!(from_json, from_binary);
            assert_eq!(from_json.traffic_stats, stats.for_version(version));
        }

        let v0 = RelayUpdateRequest::from_json(&update_json(0, &pings)).unwrap();
        assert_eq!(v0.traffic_stats.pong_rx, 0);
        assert_eq!(v0.traffic_stats.bytes_sent, 99);
        let v1 = RelayUpdateRequest::from_json(&update_json(1, &pings)).unwrap();
        assert_eq!(v1.traffic_stats.pong_rx, 77);
        assert_eq!(v1.traffic_stats.bytes_sent, 0);
    }

    #[test]
    fn test_update_request_to_json_rejects_dropped_counter() {
        let mut request =
            RelayUpdateRequest::from_json(&update_json(0, &serde_json::json!([]))).unwrap();
        request.traffic_stats.pong_rx = 77;
        assert_eq!(
            request.to_json().unwrap_err(),
            PacketError::InvalidValue {
                field: "pong_rx",
                value: 77
            }
        );
    }

    #[test]
    fn test_update_request_json_ping_stats_bounded() {
        let entry = serde_json::json!({ "relay_id": 1, "rtt": 1.0, "jitter": 0.0, "packet_loss": 0.0 });
        let at_limit = serde_json::Value::Array(vec![entry.clone(); MAX_RELAYS]);
        let request = RelayUpdateRequest::from_json(&update_json(1, &at_limit)).unwrap();
        assert_eq!(request.ping_stats.len(), MAX_RELAYS);

        for len in [MAX_RELAYS + 1, 4 * MAX_RELAYS] {
            let over = serde_json::Value::Array(vec![entry.clone(); len]);
            assert_eq!(
                RelayUpdateRequest::from_json(&update_json(1, &over)).unwrap_err(),
                PacketError::CountTooLarge {
                    field: "ping stats",
                    count: MAX_RELAYS + 1,
                    max: MAX_RELAYS
                }
            );
        }
    }

    #[test]
    fn test_update_response_json_ping_data_bounded() {
        let target = serde_json::json!({ "id": 1, "address": "10.0.0.1:40000" });
        let json = serde_json::to_vec(&serde_json::json!({
            "version": 0,
            "timestamp": 1,
            "ping_data": vec![target; MAX_RELAYS + 7],
        }))
        .unwrap();
        assert!(matches!(
            RelayUpdateResponse::from_json(&json),
            Err(PacketError::CountTooLarge { count, .. }) if count == MAX_RELAYS + 1
        ));
    }

    #[test]
    fn test_update_request_json_future_version() {
        let json = format!(
            r#"{{"version":5,"relay_address":"10.0.0.9:40000","token":"{}"}}"#,
            STANDARD.encode([0u8; 32])
        );
        assert!(matches!(
            RelayUpdateRequest::from_json(json.as_bytes()),
            Err(PacketError::UnsupportedVersion { version: 5, .. })
        ));
    }

    #[test]
    fn test_update_response_json_roundtrip() {
        let response = RelayUpdateResponse {
            version: 0,
            timestamp: 100,
            relays_to_ping: vec![RelayPingTarget {
                id: 4,
                address: "10.0.0.4:40000".parse().unwrap(),
            }],
        };
        let json = response.to_json().unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"ping_data\""));
        assert_eq!(RelayUpdateResponse::from_json(&json).unwrap(), response);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RelayInitResponse::from_json(b"{not json"),
            Err(PacketError::Json(_))
        ));
    }
}
