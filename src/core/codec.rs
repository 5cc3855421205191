//! Little-endian byte reader/writer shared by the token and packet codecs.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::error::CodecError;

/// Address family tag for IPv4 on the wire.
const ADDRESS_IPV4: u8 = 4;
/// Address family tag for IPv6 on the wire.
const ADDRESS_IPV6: u8 = 6;

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a LE u16.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a LE u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a LE u64.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a LE f64.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a socket address as `family | ip | port`.
    pub fn write_address(&mut self, address: &SocketAddr) {
        match address.ip() {
            IpAddr::V4(ip) => {
                self.write_u8(ADDRESS_IPV4);
                self.write_bytes(&ip.octets());
            }
            IpAddr::V6(ip) => {
                self.write_u8(ADDRESS_IPV6);
                self.write_bytes(&ip.octets());
            }
        }
        self.write_u16(address.port());
    }

    /// Zero-pad up to `len` bytes total.
    ///
    /// Fails if the buffer is already longer than `len`.
    pub fn pad_to(&mut self, len: usize) -> Result<(), CodecError> {
        if self.buf.len() > len {
            return Err(CodecError::Overflow(self.buf.len()));
        }
        self.buf.resize(len, 0);
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian reader.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Wrap a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self.buf.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a LE u16.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a LE u32.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a LE u64.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a LE f64.
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a socket address written by [`WireWriter::write_address`].
    pub fn read_address(&mut self) -> Result<SocketAddr, CodecError> {
        let ip = match self.read_u8()? {
            ADDRESS_IPV4 => IpAddr::V4(Ipv4Addr::from(self.read_array::<4>()?)),
            ADDRESS_IPV6 => IpAddr::V6(Ipv6Addr::from(self.read_array::<16>()?)),
            other => return Err(CodecError::InvalidAddress(other)),
        };
        let port = self.read_u16()?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Everything not yet read.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
