//! Datagram encoding and decoding
//!
//! AniDB requests and replies are single UTF-8 datagrams. Replies are never
//! fragmented, so the codec only validates size and text encoding.

use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use log::trace;

/// Codec for AniDB datagrams
pub struct Codec {
    buffer: BytesMut,
}

impl Codec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// Encode a request line into a datagram
    pub fn encode(&mut self, request: &str) -> Result<Bytes> {
        if request.is_empty() {
            return Err(ProtocolError::Encoding("Empty command".to_string()));
        }
        if request.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::packet_too_large(request.len(), MAX_PACKET_SIZE));
        }

        self.buffer.clear();
        self.buffer.put(request.as_bytes());
        Ok(self.buffer.split().freeze())
    }

    /// Decode a reply datagram, dropping the trailing newline
    pub fn decode(&self, datagram: &[u8]) -> Result<String> {
        if datagram.is_empty() {
            return Err(ProtocolError::invalid_packet("Empty response"));
        }
        let text = std::str::from_utf8(datagram)
            .map_err(|e| ProtocolError::invalid_packet(format!("Invalid UTF-8: {e}")))?;
        trace!("Decoded {} bytes", datagram.len());
        Ok(text.trim_end_matches(['\n', '\r']).to_string())
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple_command() {
        let mut codec = Codec::new();
        let encoded = codec.encode("PING").unwrap();
        assert_eq!(&encoded[..], b"PING");
    }

    #[test]
    fn test_encode_rejects_empty_and_oversized() {
        let mut codec = Codec::new();
        assert!(matches!(codec.encode(""), Err(ProtocolError::Encoding(_))));

        let long = "X".repeat(MAX_PACKET_SIZE + 1);
        assert!(matches!(
            codec.encode(&long),
            Err(ProtocolError::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_trims_newline() {
        let codec = Codec::new();
        let decoded = codec.decode(b"300 PONG\n").unwrap();
        assert_eq!(decoded, "300 PONG");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let codec = Codec::new();
        assert!(codec.decode(&[0xff, 0xfe]).is_err());
        assert!(codec.decode(&[]).is_err());
    }
}
