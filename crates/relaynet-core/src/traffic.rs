//! Relay traffic counters.
//!
//! Version 0 carries only the session count and byte totals. Version 1 carries
//! the per-packet-type counters and no byte totals. Fields a version does not
//! carry decode as zero, and encoding refuses to drop a non-zero one.

use crate::codec::{Reader, Result, Writer, check_version};
use crate::error::PacketError;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Highest traffic stats layout understood by this codec.
pub const MAX_TRAFFIC_STATS_VERSION: u32 = 1;

/// Traffic counters reported by a relay on every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficStats {
    /// Session count
    pub session_count: u64,
    /// Outbound ping packets sent
    pub outbound_ping_tx: u64,
    /// Route request packets received
    pub route_request_rx: u64,
    /// Route request packets sent
    pub route_request_tx: u64,
    /// Route response packets received
    pub route_response_rx: u64,
    /// Route response packets sent
    pub route_response_tx: u64,
    /// Client to server packets received
    pub client_to_server_rx: u64,
    /// Client to server packets sent
    pub client_to_server_tx: u64,
    /// Server to client packets received
    pub server_to_client_rx: u64,
    /// Server to client packets sent
    pub server_to_client_tx: u64,
    /// Inbound ping packets received
    pub inbound_ping_rx: u64,
    /// Inbound ping packets sent
    pub inbound_ping_tx: u64,
    /// Pong packets received
    pub pong_rx: u64,
    /// Session ping packets received
    pub session_ping_rx: u64,
    /// Session ping packets sent
    pub session_ping_tx: u64,
    /// Session pong packets received
    pub session_pong_rx: u64,
    /// Session pong packets sent
    pub session_pong_tx: u64,
    /// Continue request packets received
    pub continue_request_rx: u64,
    /// Continue request packets sent
    pub continue_request_tx: u64,
    /// Continue response packets received
    pub continue_response_rx: u64,
    /// Continue response packets sent
    pub continue_response_tx: u64,
    /// Near ping packets received
    pub near_ping_rx: u64,
    /// Near ping packets sent
    pub near_ping_tx: u64,
    /// Unknown packets received
    pub unknown_rx: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
}

macro_rules! v1_fields {
    ($m:ident) => {
        $m!(
            session_count,
            outbound_ping_tx,
            route_request_rx,
            route_request_tx,
            route_response_rx,
            route_response_tx,
            client_to_server_rx,
            client_to_server_tx,
            server_to_client_rx,
            server_to_client_tx,
            inbound_ping_rx,
            inbound_ping_tx,
            pong_rx,
            session_ping_rx,
            session_ping_tx,
            session_pong_rx,
            session_pong_tx,
            continue_request_rx,
            continue_request_tx,
            continue_response_rx,
            continue_response_tx,
            near_ping_rx,
            near_ping_tx,
            unknown_rx
        )
    };
}

impl TrafficStats {
    /// Decode the counters laid out for `version`.
    ///
    /// # Errors
    ///
    /// Returns a truncation error naming the first missing counter, or
    /// `UnsupportedVersion` for an unknown layout.
    pub fn read(reader: &mut Reader<'_>, version: u32) -> Result<Self> {
        check_version("traffic stats", version, MAX_TRAFFIC_STATS_VERSION)?;
        let mut stats = Self::default();
        if version == 0 {
            stats.session_count = reader.read_u64("session count")?;
            stats.bytes_sent = reader.read_u64("bytes sent")?;
            stats.bytes_received = reader.read_u64("bytes received")?;
            return Ok(stats);
        }

        macro_rules! read_all {
            ($($name:ident),*) => {
                $( stats.$name = reader.read_u64(stringify!($name))?; )*
            };
        }
        v1_fields!(read_all);
        Ok(stats)
    }

    /// Copy keeping only the counters laid out for `version`.
    ///
    /// This is the value a decode of `version` yields, whichever wire form
    /// it came from.
    #[must_use]
    pub fn for_version(self, version: u32) -> Self {
        if version == 0 {
            Self {
                session_count: self.session_count,
                bytes_sent: self.bytes_sent,
                bytes_received: self.bytes_received,
                ..Self::default()
            }
        } else {
            Self {
                bytes_sent: 0,
                bytes_received: 0,
                ..self
            }
        }
    }

    /// Check that every non-zero counter is carried by `version`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` naming the first counter the layout would
    /// drop, or `UnsupportedVersion` for an unknown layout.
    pub fn check_layout(&self, version: u32) -> Result<()> {
        check_version("traffic stats", version, MAX_TRAFFIC_STATS_VERSION)?;
        let kept = self.for_version(version);
        if kept == *self {
            return Ok(());
        }

        macro_rules! first_dropped {
            ($($name:ident),*) => {
                $(
                    if self.$name != kept.$name {
                        return Err(PacketError::InvalidValue {
                            field: stringify!($name),
                            value: self.$name,
                        });
                    }
                )*
            };
        }
        v1_fields!(first_dropped);
        first_dropped!(bytes_sent, bytes_received);
        Ok(())
    }

    /// Encode the counters laid out for `version`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if a non-zero counter is not carried by
    /// `version`, or `UnsupportedVersion` for an unknown layout.
    pub fn write(&self, writer: &mut Writer, version: u32) -> Result<()> {
        self.check_layout(version)?;
        if version == 0 {
            writer.write_u64(self.session_count);
            writer.write_u64(self.bytes_sent);
            writer.write_u64(self.bytes_received);
            return Ok(());
        }

        macro_rules! write_all {
            ($($name:ident),*) => {
                $( writer.write_u64(self.$name); )*
            };
        }
        v1_fields!(write_all);
        Ok(())
    }

    /// Encoded size in bytes for `version`.
    #[must_use]
    pub const fn encoded_len(version: u32) -> usize {
        if version == 0 { 3 * 8 } else { 24 * 8 }
    }

    /// Relay-to-relay packets received.
    #[must_use]
    pub fn other_stats_rx(&self) -> u64 {
        self.pong_rx + self.inbound_ping_rx
    }

    /// Relay-to-relay packets sent.
    #[must_use]
    pub fn other_stats_tx(&self) -> u64 {
        self.outbound_ping_tx + self.inbound_ping_tx
    }

    /// Game traffic packets received.
    #[must_use]
    pub fn game_stats_rx(&self) -> u64 {
        self.route_request_rx
            + self.route_response_rx
            + self.client_to_server_rx
            + self.server_to_client_rx
            + self.session_ping_rx
            + self.session_pong_rx
            + self.continue_request_rx
            + self.continue_response_rx
            + self.near_ping_rx
    }

    /// Game traffic packets sent.
    #[must_use]
    pub fn game_stats_tx(&self) -> u64 {
        self.route_request_tx
            + self.route_response_tx
            + self.client_to_server_tx
            + self.server_to_client_tx
            + self.session_ping_tx
            + self.session_pong_tx
            + self.continue_request_tx
            + self.continue_response_tx
            + self.near_ping_tx
    }

    /// All packets received, including unclassified ones.
    #[must_use]
    pub fn all_rx(&self) -> u64 {
        self.other_stats_rx() + self.game_stats_rx() + self.unknown_rx
    }

    /// All packets sent.
    #[must_use]
    pub fn all_tx(&self) -> u64 {
        self.other_stats_tx() + self.game_stats_tx()
    }
}

impl AddAssign for TrafficStats {
    fn add_assign(&mut self, other: Self) {
        macro_rules! add_all {
            ($($name:ident),*) => {
                $( self.$name = self.$name.saturating_add(other.$name); )*
            };
        }
        v1_fields!(add_all);
        self.bytes_sent = self.bytes_sent.saturating_add(other.bytes_sent);
        self.bytes_received = self.bytes_received.saturating_add(other.bytes_received);
    }
}

impl Add for TrafficStats {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}
