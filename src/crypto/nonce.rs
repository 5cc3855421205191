//! Nonce construction for packet sealing.
//!
//! Session keys are already directional (one key per direction), so the
//! 24-byte nonce only needs to be unique per key:
//! - Zeros (16 bytes)
//! - Sequence (8 bytes, LE64)

use crate::core::NONCE_BYTES;

/// Construct the 24-byte XChaCha20-Poly1305 nonce for a packet sequence.
///
/// Layout:
/// ```text
/// [ zeros (16) | sequence (8) ]
/// ```
pub fn packet_nonce(sequence: u64) -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    nonce[16..24].copy_from_slice(&sequence.to_le_bytes());
    nonce
}

/// Recover the sequence from a packet nonce.
pub fn parse_packet_nonce(nonce: &[u8; NONCE_BYTES]) -> u64 {
    let mut sequence = [0u8; 8];
    sequence.copy_from_slice(&nonce[16..24]);
    u64::from_le_bytes(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_layout() {
        let nonce = packet_nonce(42);
        assert_eq!(&nonce[0..16], &[0u8; 16]);
        assert_eq!(&nonce[16..24], &42u64.to_le_bytes());
    }

    #[test]
    fn test_nonce_parse() {
        let sequence = 0xDEAD_BEEF_CAFE_BABE;
        assert_eq!(parse_packet_nonce(&packet_nonce(sequence)), sequence);
    }
}
