//! Backend configuration

use relaynet_core::SdkVersion;
use std::time::Duration;

/// Backend tuning shared by every handler
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Lifetime of a relay's liveness record without an update
    pub relay_ttl: Duration,

    /// Lifetime of a server entry without an update
    pub server_ttl: Duration,

    /// Lifetime of a session entry without an update
    pub session_ttl: Duration,

    /// Deadline for each durable or ephemeral store call
    pub store_timeout: Duration,

    /// Oldest SDK accepted on server packets
    pub sdk_version_min: SdkVersion,

    /// Relay pairs with more jitter than this are left out of the cost matrix
    pub max_jitter: f32,

    /// Relay pairs with more packet loss than this are left out of the cost matrix
    pub max_packet_loss: f32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            relay_ttl: Duration::from_secs(30),
            server_ttl: Duration::from_secs(30),
            session_ttl: Duration::from_secs(60),
            store_timeout: Duration::from_secs(3),
            sdk_version_min: SdkVersion::new(4, 0, 0),
            max_jitter: 10.0,
            max_packet_loss: 0.1,
        }
    }
}
