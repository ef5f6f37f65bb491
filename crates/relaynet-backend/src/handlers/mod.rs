//! Protocol handlers.
//!
//! Relay handlers speak an HTTP-style request/response protocol with binary
//! or JSON bodies. Server and session packets arrive as datagrams whose first
//! byte is the packet type; [`handle_server_packet`] dispatches them.

pub mod relay;
pub mod server;

pub use relay::{relay_init, relay_update};
pub use server::{handle_server_packet, server_init, server_update, session_update};

use crate::error::{HandlerError, Status, StoreError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// Body encoding of a relay request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `application/octet-stream`
    OctetStream,
    /// `application/json`
    Json,
}

impl ContentType {
    /// Parse a `Content-Type` header value.
    ///
    /// A missing or empty header means binary. Parameters after `;` are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::UnsupportedContentType`] for any other media type.
    pub fn parse(header: Option<&str>) -> Result<Self, HandlerError> {
        let media_type = header
            .and_then(|h| h.split(';').next())
            .map(str::trim)
            .unwrap_or_default();
        if media_type.is_empty() || media_type.eq_ignore_ascii_case("application/octet-stream") {
            Ok(Self::OctetStream)
        } else if media_type.eq_ignore_ascii_case("application/json") {
            Ok(Self::Json)
        } else {
            Err(HandlerError::UnsupportedContentType(media_type.to_string()))
        }
    }

    /// Header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OctetStream => "application/octet-stream",
            Self::Json => "application/json",
        }
    }
}

/// Successful handler reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status, always [`Status::Ok`] for a reply built by a handler
    pub status: Status,
    /// Body encoding
    pub content_type: ContentType,
    /// Encoded body
    pub body: Vec<u8>,
}

impl Response {
    /// 200 reply.
    #[must_use]
    pub fn ok(content_type: ContentType, body: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            content_type,
            body,
        }
    }
}

/// Renders a 64-bit identifier as 16 hex digits in log fields.
pub(crate) struct HexId(pub u64);

impl std::fmt::Display for HexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Current unix time in seconds.
pub(crate) fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Current unix time in milliseconds.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Log a rejected request at a level matching its cause.
pub(crate) fn log_rejection(endpoint: &'static str, err: &HandlerError) {
    match err {
        HandlerError::Store(StoreError::NotFound) => {
            debug!(endpoint, error = %err, "request rejected");
        }
        HandlerError::Store(_) | HandlerError::Encode(_) => {
            error!(endpoint, error = %err, transient = err.is_transient(), "request failed");
        }
        _ => warn!(endpoint, status = err.status().code(), error = %err, "request rejected"),
    }
}
