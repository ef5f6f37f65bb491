//! Error types for the relaynet backend.
//!
//! Errors fall into five groups:
//! - **Decode**: malformed, oversized or unsupported packets
//! - **Authentication**: sealed token or signature failures
//! - **Authorization/state**: known participant not allowed to proceed
//! - **Store**: transient infrastructure failures, retried by the caller
//! - **Degraded**: session packets that fail authentication still get a signed
//!   direct-route answer, so they never surface here
//!
//! # Example
//!
//! ```ignore
//! use relaynet_backend::HandlerError;
//!
//! fn report(err: &HandlerError) {
//!     if err.is_transient() {
//!         // caller retries on its next scheduled update
//!     }
//!     let code = err.status().code();
//! }
//! ```

use crate::state::LifecycleError;
use relaynet_core::{PacketError, SdkVersion};
use relaynet_crypto::CryptoError;
use std::time::Duration;
use thiserror::Error;

/// Errors from the durable or ephemeral store tiers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record does not exist (or has expired)
    #[error("record not found")]
    NotFound,

    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store did not answer within the deadline
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Record exists but could not be decoded
    #[error("corrupt record {key}: {reason}")]
    Corrupt {
        /// Store key
        key: String,
        /// Decode failure
        reason: String,
    },
}

/// HTTP-style status of a handled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 200
    Ok,
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 500
    InternalServerError,
}

impl Status {
    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InternalServerError => 500,
        }
    }
}

/// Reasons a handler rejects a request
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Request body could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[from] PacketError),

    /// Content type is neither binary nor JSON
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Init request magic does not match
    #[error("invalid init request magic 0x{0:08x}")]
    InvalidMagic(u32),

    /// Relay is not in the durable directory
    #[error("relay {0:016x} not found")]
    RelayNotFound(u64),

    /// Relay has no live ephemeral record
    #[error("relay {0:016x} not initialized")]
    RelayNotInitialized(u64),

    /// Relay state forbids the operation
    #[error("relay {id:016x} rejected: {source}")]
    Lifecycle {
        /// Relay ID
        id: u64,
        /// Lifecycle rule that failed
        #[source]
        source: LifecycleError,
    },

    /// Sealed token or signature did not verify
    #[error("authentication failed: {0}")]
    AuthFailed(#[source] CryptoError),

    /// Update token differs from the registered public key
    #[error("relay {0:016x} token mismatch")]
    TokenMismatch(u64),

    /// Relay already has a live ephemeral record
    #[error("relay {0:016x} already initialized")]
    AlreadyInitialized(u64),

    /// Sequence number is not newer than the stored one
    #[error("stale sequence {received} (stored {stored})")]
    StaleSequence {
        /// Sequence in the packet
        received: u64,
        /// Sequence already stored
        stored: u64,
    },

    /// SDK version below the supported minimum
    #[error("sdk version {version} below minimum {minimum}")]
    SdkTooOld {
        /// Version in the packet
        version: SdkVersion,
        /// Configured minimum
        minimum: SdkVersion,
    },

    /// Customer is not in the durable directory
    #[error("buyer {0:016x} not found")]
    BuyerNotFound(u64),

    /// No live server entry for the session's server
    #[error("server {address} for buyer {customer_id:016x} not found")]
    ServerNotFound {
        /// Customer ID
        customer_id: u64,
        /// Server address
        address: String,
    },

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Response could not be encoded
    #[error("encode failed: {0}")]
    Encode(#[source] PacketError),
}

impl HandlerError {
    /// Status reported to the caller.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Decode(_)
            | Self::UnsupportedContentType(_)
            | Self::InvalidMagic(_)
            | Self::StaleSequence { .. }
            | Self::SdkTooOld { .. } => Status::BadRequest,
            Self::Lifecycle { .. } | Self::AuthFailed(_) | Self::TokenMismatch(_) => {
                Status::Unauthorized
            }
            Self::RelayNotFound(_)
            | Self::RelayNotInitialized(_)
            | Self::BuyerNotFound(_)
            | Self::ServerNotFound { .. }
            | Self::Store(StoreError::NotFound) => Status::NotFound,
            Self::AlreadyInitialized(_) => Status::Conflict,
            Self::Store(_) | Self::Encode(_) => Status::InternalServerError,
        }
    }

    /// Returns true if the same request may succeed on a later attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable(_) | StoreError::Timeout(_))
        )
    }
}
