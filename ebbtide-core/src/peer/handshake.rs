//! BitTorrent handshake serialization and deserialization.

use crate::torrent::{InfoHash, PeerId, TorrentError};

/// Protocol identifier exchanged in every handshake.
pub const PROTOCOL: &str = "BitTorrent protocol";

/// Wire length of a complete handshake message.
pub const HANDSHAKE_LEN: usize = 68;

/// BitTorrent connection handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Serializes the handshake into its 68-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_LEN);
        buf.push(PROTOCOL.len() as u8);
        buf.extend_from_slice(PROTOCOL.as_bytes());
        buf.extend_from_slice(&self.reserved);
        buf.extend_from_slice(self.info_hash.as_bytes());
        buf.extend_from_slice(self.peer_id.as_bytes());
        buf
    }

    /// Deserializes a 68-byte handshake, rejecting foreign protocols.
    ///
    /// # Errors
    /// - `TorrentError::ProtocolError` - Short buffer or unknown protocol string
    pub fn decode(data: &[u8]) -> Result<Self, TorrentError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(TorrentError::ProtocolError {
                message: "Handshake too short".to_string(),
            });
        }
        if data[0] as usize != PROTOCOL.len() || &data[1..20] != PROTOCOL.as_bytes() {
            return Err(TorrentError::ProtocolError {
                message: "Unknown wire protocol in handshake".to_string(),
            });
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            reserved,
            info_hash: InfoHash::new(info_hash),
            peer_id: PeerId::new(peer_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_round_trip() {
        let handshake = Handshake::new(InfoHash::new([0x11; 20]), PeerId::new([0x22; 20]));
        let encoded = handshake.encode();
        assert_eq!(encoded.len(), HANDSHAKE_LEN);
        assert_eq!(encoded[0], 19);

        let decoded = Handshake::decode(&encoded).unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let result = Handshake::decode(&[0u8; 40]);
        assert!(matches!(result, Err(TorrentError::ProtocolError { .. })));
    }

    #[test]
    fn test_decode_rejects_foreign_protocol() {
        let handshake = Handshake::new(InfoHash::new([0x11; 20]), PeerId::new([0x22; 20]));
        let mut encoded = handshake.encode();
        encoded[1..20].copy_from_slice(b"NotTorrent protocol");
        assert!(Handshake::decode(&encoded).is_err());
    }
}
