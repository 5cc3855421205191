//! Packet types and wire format.
//!
//! Every datagram starts with a 9-byte header:
//! ```text
//! +--------+--------------------+---------------------------------+
//! | Type   | Sequence           | Body                            |
//! | 1 byte | 8 bytes (LE64)     | sealed, or plain for requests   |
//! +--------+--------------------+---------------------------------+
//! ```
//! All packets except [`Packet::ConnectionRequest`] carry a body sealed
//! under the sender's directional session key with
//! `nonce = packet_nonce(sequence)` and
//! `aad = type | sequence | protocol_id`.

use crate::core::{
    CodecError, Time, WireReader, WireWriter, CHALLENGE_TOKEN_BYTES, CONNECT_TOKEN_BYTES,
    MAC_BYTES, MAX_PAYLOAD_BYTES, NONCE_BYTES, PACKET_HEADER_BYTES,
};
use crate::crypto::{decrypt, encrypt, packet_nonce, Key, TokenNonce};

use super::error::TransportError;

/// Packet type discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client presents its connect token.
    ConnectionRequest = 0x00,
    /// Server refuses the connection (no free slot).
    ConnectionDenied = 0x01,
    /// Server answers a valid request with a challenge token.
    ConnectionChallenge = 0x02,
    /// Client echoes the challenge token.
    ConnectionResponse = 0x03,
    /// Liveness packet; the first one from the server accepts the client.
    KeepAlive = 0x04,
    /// Opaque application data.
    Payload = 0x05,
    /// Best-effort graceful disconnect.
    Disconnect = 0x06,
}

impl PacketType {
    /// Parse packet type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::ConnectionRequest),
            0x01 => Some(Self::ConnectionDenied),
            0x02 => Some(Self::ConnectionChallenge),
            0x03 => Some(Self::ConnectionResponse),
            0x04 => Some(Self::KeepAlive),
            0x05 => Some(Self::Payload),
            0x06 => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Convert packet type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Body of a connection request.
///
/// Sent in the clear: the token inside is already sealed under the server
/// private key with `protocol_id` and `expire_timestamp` as AAD.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    /// Protocol the client speaks.
    pub protocol_id: u64,
    /// Token expiry (authenticated by the token seal).
    pub expire_timestamp: Time,
    /// Token nonce.
    pub token_nonce: TokenNonce,
    /// Sealed token, `CONNECT_TOKEN_BYTES` long.
    pub token_data: Vec<u8>,
}

/// Body shared by challenge and response packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Sequence the challenge token was sealed with.
    pub sequence: u64,
    /// Sealed challenge token, `CHALLENGE_TOKEN_BYTES` long.
    pub token_data: Vec<u8>,
}

/// A protocol packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Client -> server: present a connect token.
    ConnectionRequest(ConnectionRequest),
    /// Server -> client: no free slot.
    ConnectionDenied,
    /// Server -> client: prove you hold the session keys.
    ConnectionChallenge(Challenge),
    /// Client -> server: challenge echoed back.
    ConnectionResponse(Challenge),
    /// Either direction: liveness. Carries the client's slot.
    KeepAlive {
        /// Slot index the server assigned to the client.
        client_index: u32,
        /// Server slot capacity.
        max_clients: u32,
    },
    /// Either direction: application data.
    Payload(Vec<u8>),
    /// Either direction: graceful disconnect.
    Disconnect,
}

/// Parsed datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type.
    pub packet_type: PacketType,
    /// Sender sequence (per direction).
    pub sequence: u64,
}

impl PacketHeader {
    /// Parse the header, returning it with the remaining body bytes.
    pub fn read(bytes: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let mut reader = WireReader::new(bytes);
        let type_byte = reader.read_u8()?;
        let packet_type =
            PacketType::from_byte(type_byte).ok_or(CodecError::InvalidPacketType(type_byte))?;
        let sequence = reader.read_u64()?;
        Ok((
            Self {
                packet_type,
                sequence,
            },
            reader.remaining(),
        ))
    }

    /// Additional authenticated data for a sealed body.
    pub fn aad(&self, protocol_id: u64) -> [u8; 17] {
        let mut aad = [0u8; 17];
        aad[0] = self.packet_type.as_byte();
        aad[1..9].copy_from_slice(&self.sequence.to_le_bytes());
        aad[9..17].copy_from_slice(&protocol_id.to_le_bytes());
        aad
    }
}

impl Packet {
    /// Get the type discriminator.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ConnectionRequest(_) => PacketType::ConnectionRequest,
            Packet::ConnectionDenied => PacketType::ConnectionDenied,
            Packet::ConnectionChallenge(_) => PacketType::ConnectionChallenge,
            Packet::ConnectionResponse(_) => PacketType::ConnectionResponse,
            Packet::KeepAlive { .. } => PacketType::KeepAlive,
            Packet::Payload(_) => PacketType::Payload,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Whether the body is sealed under a session key.
    pub fn is_sealed(&self) -> bool {
        !matches!(self, Packet::ConnectionRequest(_))
    }

    /// Serialize the body (plaintext).
    pub fn write_body(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::new();
        match self {
            Packet::ConnectionRequest(request) => {
                if request.token_data.len() != CONNECT_TOKEN_BYTES {
                    return Err(CodecError::Overflow(request.token_data.len()));
                }
                writer.write_u64(request.protocol_id);
                writer.write_f64(request.expire_timestamp);
                writer.write_bytes(request.token_nonce.as_bytes());
                writer.write_bytes(&request.token_data);
            }
            Packet::ConnectionChallenge(challenge) | Packet::ConnectionResponse(challenge) => {
                if challenge.token_data.len() != CHALLENGE_TOKEN_BYTES {
                    return Err(CodecError::Overflow(challenge.token_data.len()));
                }
                writer.write_u64(challenge.sequence);
                writer.write_bytes(&challenge.token_data);
            }
            Packet::KeepAlive {
                client_index,
                max_clients,
            } => {
                writer.write_u32(*client_index);
                writer.write_u32(*max_clients);
            }
            Packet::Payload(data) => {
                if data.len() > MAX_PAYLOAD_BYTES {
                    return Err(CodecError::PayloadTooLarge(data.len()));
                }
                writer.write_bytes(data);
            }
            Packet::ConnectionDenied | Packet::Disconnect => {}
        }
        Ok(writer.into_bytes())
    }

    /// Parse a body of the given type.
    pub fn read_body(packet_type: PacketType, body: &[u8]) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(body);
        let packet = match packet_type {
            PacketType::ConnectionRequest => Packet::ConnectionRequest(ConnectionRequest {
                protocol_id: reader.read_u64()?,
                expire_timestamp: reader.read_f64()?,
                token_nonce: TokenNonce::from_bytes(reader.read_array::<NONCE_BYTES>()?),
                token_data: reader.read_bytes(CONNECT_TOKEN_BYTES)?.to_vec(),
            }),
            PacketType::ConnectionChallenge => Packet::ConnectionChallenge(Challenge {
                sequence: reader.read_u64()?,
                token_data: reader.read_bytes(CHALLENGE_TOKEN_BYTES)?.to_vec(),
            }),
            PacketType::ConnectionResponse => Packet::ConnectionResponse(Challenge {
                sequence: reader.read_u64()?,
                token_data: reader.read_bytes(CHALLENGE_TOKEN_BYTES)?.to_vec(),
            }),
            PacketType::KeepAlive => Packet::KeepAlive {
                client_index: reader.read_u32()?,
                max_clients: reader.read_u32()?,
            },
            PacketType::Payload => {
                let data = reader.remaining();
                if data.len() > MAX_PAYLOAD_BYTES {
                    return Err(CodecError::PayloadTooLarge(data.len()));
                }
                Packet::Payload(data.to_vec())
            }
            PacketType::ConnectionDenied => Packet::ConnectionDenied,
            PacketType::Disconnect => Packet::Disconnect,
        };
        Ok(packet)
    }

    /// Encode a full datagram.
    ///
    /// `key` is the sender's directional key and is required for every
    /// sealed packet type; it is ignored for connection requests.
    pub fn encode(
        &self,
        sequence: u64,
        protocol_id: u64,
        key: Option<&Key>,
    ) -> Result<Vec<u8>, TransportError> {
        let header = PacketHeader {
            packet_type: self.packet_type(),
            sequence,
        };
        let body = self.write_body()?;

        let mut datagram = Vec::with_capacity(PACKET_HEADER_BYTES + body.len() + MAC_BYTES);
        datagram.push(header.packet_type.as_byte());
        datagram.extend_from_slice(&sequence.to_le_bytes());

        if self.is_sealed() {
            let key = key.ok_or(TransportError::Crypto(crate::core::CryptoError::EncryptionFailed))?;
            let sealed = encrypt(key, &packet_nonce(sequence), &header.aad(protocol_id), &body)?;
            datagram.extend_from_slice(&sealed);
        } else {
            datagram.extend_from_slice(&body);
        }
        Ok(datagram)
    }

    /// Open and parse a sealed body.
    pub fn open(
        header: &PacketHeader,
        sealed_body: &[u8],
        protocol_id: u64,
        key: &Key,
    ) -> Result<Self, TransportError> {
        let body = decrypt(
            key,
            &packet_nonce(header.sequence),
            &header.aad(protocol_id),
            sealed_body,
        )
        .map_err(|_| TransportError::AuthenticationFailed)?;
        Ok(Self::read_body(header.packet_type, &body)?)
    }
}
