//! Little-endian cursor reader and writer shared by every packet.
//!
//! Wire conventions:
//! - integers and floats are little-endian
//! - strings are a `u32` byte length followed by UTF-8 bytes, bounded per field
//! - arrays are a `u32` count, bounded per field before any element is read
//! - keys, nonces, tokens and signatures are fixed-size byte blobs
//!
//! Trailing bytes after the last field are ignored.

use crate::error::PacketError;
use std::net::SocketAddr;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, PacketError>;

/// Reject `version` if it is above `max`.
///
/// # Errors
///
/// Returns [`PacketError::UnsupportedVersion`].
pub fn check_version(kind: &'static str, version: u32, max: u32) -> Result<()> {
    if version > max {
        return Err(PacketError::UnsupportedVersion { kind, version, max });
    }
    Ok(())
}

/// Parse a textual `ip:port` endpoint.
///
/// # Errors
///
/// Returns [`PacketError::InvalidAddress`] if `value` is not a socket address.
pub fn parse_address(field: &'static str, value: &str) -> Result<SocketAddr> {
    value.parse().map_err(|_| PacketError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

/// Cursor over an inbound packet.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(PacketError::Truncated { field });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a fixed-size byte blob.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    /// Read a `u8`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.read_array::<1>(field)?[0])
    }

    /// Read a `u8` flag; any non-zero value is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_bool(&mut self, field: &'static str) -> Result<bool> {
        Ok(self.read_u8(field)? != 0)
    }

    /// Read a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(field)?))
    }

    /// Read a little-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_u64(&mut self, field: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array(field)?))
    }

    /// Read a little-endian `f32`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_f32(&mut self, field: &'static str) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array(field)?))
    }

    /// Read a little-endian `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] on a short buffer.
    pub fn read_f64(&mut self, field: &'static str) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array(field)?))
    }

    /// Read the leading version field and check it against `max`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] or [`PacketError::UnsupportedVersion`].
    pub fn read_version(&mut self, kind: &'static str, max: u32) -> Result<u32> {
        let version = self.read_u32("version")?;
        check_version(kind, version, max)?;
        Ok(version)
    }

    /// Read a length-prefixed UTF-8 string of at most `max` bytes.
    ///
    /// The length is checked before the string body is touched.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`], [`PacketError::StringTooLong`] or
    /// [`PacketError::InvalidUtf8`].
    pub fn read_string(&mut self, field: &'static str, max: usize) -> Result<String> {
        let len = self.read_u32(field)? as usize;
        if len > max {
            return Err(PacketError::StringTooLong { field, len, max });
        }
        let bytes = self.take(len, field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| PacketError::InvalidUtf8 { field })
    }

    /// Read a length-prefixed `ip:port` address.
    ///
    /// # Errors
    ///
    /// As [`Reader::read_string`], plus [`PacketError::InvalidAddress`].
    pub fn read_address(&mut self, field: &'static str, max: usize) -> Result<SocketAddr> {
        let text = self.read_string(field, max)?;
        parse_address(field, &text)
    }

    /// Read a `u32` array count and bound it by `max`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] or [`PacketError::CountTooLarge`].
    pub fn read_count(&mut self, field: &'static str, max: usize) -> Result<usize> {
        let count = self.read_u32(field)? as usize;
        if count > max {
            return Err(PacketError::CountTooLarge { field, count, max });
        }
        Ok(count)
    }
}

/// Growable outbound packet buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume into the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a `u8`.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append a flag as `0` or `1`.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Append a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian `f32`.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian `f64`.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a length-prefixed string of at most `max` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::StringTooLong`] so the writer never produces a
    /// string the reader would refuse.
    pub fn write_string(&mut self, field: &'static str, value: &str, max: usize) -> Result<()> {
        if value.len() > max {
            return Err(PacketError::StringTooLong {
                field,
                len: value.len(),
                max,
            });
        }
        self.write_u32(value.len() as u32);
        self.write_bytes(value.as_bytes());
        Ok(())
    }

    /// Append an address in its textual `ip:port` form.
    ///
    /// # Errors
    ///
    /// See [`Writer::write_string`].
    pub fn write_address(
        &mut self,
        field: &'static str,
        value: &SocketAddr,
        max: usize,
    ) -> Result<()> {
        self.write_string(field, &value.to_string(), max)
    }

    /// Append an array count of at most `max`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::CountTooLarge`].
    pub fn write_count(&mut self, field: &'static str, count: usize, max: usize) -> Result<()> {
        if count > max {
            return Err(PacketError::CountTooLarge { field, count, max });
        }
        self.write_u32(count as u32);
        Ok(())
    }
}
