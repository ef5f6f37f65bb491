//! Error types for packet encoding and decoding.

use thiserror::Error;

/// Packet decode/encode errors.
///
/// Every variant names the field it was raised for, so callers can match on
/// the kind of failure and still report exactly where parsing stopped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer ended before the field could be read
    #[error("invalid packet, could not read {field}")]
    Truncated {
        /// Field being read
        field: &'static str,
    },

    /// Length-prefixed string exceeds its maximum length
    #[error("invalid packet, {field} length {len} exceeds maximum {max}")]
    StringTooLong {
        /// Field being read or written
        field: &'static str,
        /// Length found
        len: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Array count exceeds its maximum
    #[error("invalid packet, {field} count {count} exceeds maximum {max}")]
    CountTooLarge {
        /// Field being read or written
        field: &'static str,
        /// Count found
        count: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Address string is not a valid `ip:port` endpoint
    #[error("invalid packet, {field} '{value}' is not a valid address")]
    InvalidAddress {
        /// Field being read
        field: &'static str,
        /// Raw value
        value: String,
    },

    /// String bytes are not valid UTF-8
    #[error("invalid packet, {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field being read
        field: &'static str,
    },

    /// Packet version is above what this codec supports
    #[error("unsupported {kind} version {version} (max {max})")]
    UnsupportedVersion {
        /// Packet kind
        kind: &'static str,
        /// Version found
        version: u32,
        /// Highest supported version
        max: u32,
    },

    /// Fixed-size field has the wrong length
    #[error("invalid packet, {field} has length {actual}, expected {expected}")]
    InvalidLength {
        /// Field being read
        field: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Enumerated field holds an unknown discriminant
    #[error("invalid packet, {field} has unknown value {value}")]
    InvalidValue {
        /// Field being read
        field: &'static str,
        /// Value found
        value: u64,
    },

    /// JSON document could not be parsed
    #[error("invalid json: {0}")]
    Json(String),
}

impl PacketError {
    /// Field the error was raised for, if any.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Truncated { field }
            | Self::StringTooLong { field, .. }
            | Self::CountTooLarge { field, .. }
            | Self::InvalidAddress { field, .. }
            | Self::InvalidUtf8 { field }
            | Self::InvalidLength { field, .. }
            | Self::InvalidValue { field, .. } => Some(field),
            Self::UnsupportedVersion { .. } | Self::Json(_) => None,
        }
    }
}

impl From<serde_json::Error> for PacketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
