use bytes::{BufMut, Bytes, BytesMut};

use super::bitfield::{self, PieceSet};
use super::error::PeerError;
use crate::constants::HANDSHAKE_LEN;

pub const PROTOCOL: &[u8] = b"BitTorrent protocol";

/// Message id of the `bitfield` message.
pub const BITFIELD_ID: u8 = 5;

/// Message id of BEP-10 extended messages.
pub const EXTENDED_ID: u8 = 20;

/// The 68-byte BitTorrent handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub reserved: [u8; 8],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut reserved = [0u8; 8];
        reserved[5] |= 0x10; // Extension protocol (BEP-10)
        reserved[7] |= 0x04; // Fast extension (BEP-6)
        Self {
            info_hash,
            peer_id,
            reserved,
        }
    }

    pub fn supports_extension_protocol(&self) -> bool {
        (self.reserved[5] & 0x10) != 0
    }

    pub fn supports_fast_extension(&self) -> bool {
        (self.reserved[7] & 0x04) != 0
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(19);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(PeerError::InvalidHandshake);
        }

        if data[0] != 19 || &data[1..20] != PROTOCOL {
            return Err(PeerError::InvalidHandshake);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            info_hash,
            peer_id,
            reserved,
        })
    }
}

/// Frames a BEP-10 extended message: length prefix, message id 20, the
/// negotiated extension id, then the payload.
pub fn extended_frame(extension_id: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(6 + payload.len());
    buf.put_u32(payload.len() as u32 + 2);
    buf.put_u8(EXTENDED_ID);
    buf.put_u8(extension_id);
    buf.put_slice(payload);
    buf.freeze()
}

/// Frames a `bitfield` message advertising the pieces held for a torrent
/// with `piece_count` pieces.
pub fn bitfield_frame(piece_count: usize, pieces: &PieceSet) -> Bytes {
    let body = bitfield::to_wire(piece_count, pieces);
    let mut buf = BytesMut::with_capacity(5 + body.len());
    buf.put_u32(body.len() as u32 + 1);
    buf.put_u8(BITFIELD_ID);
    buf.put_slice(&body);
    buf.freeze()
}
