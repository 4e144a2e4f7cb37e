//! BEP-55 holepunch message codec.
//!
//! A peer behind NAT cannot accept inbound dials, but a relay connected to
//! both sides can ask it to dial out at a coordinated moment. These are the
//! three messages that ride the `ut_holepunch` extension: `Rendezvous`
//! (initiator → relay), `Connect` (relay → both sides), and `Error`.
//!
//! [BEP-55]: http://bittorrent.org/beps/bep_0055.html

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HolepunchMessageType {
    /// Ask a relay to broker a connection to a target peer.
    Rendezvous = 0x00,
    /// Relay instruction to dial the named peer now.
    Connect = 0x01,
    Error = 0x02,
}

impl TryFrom<u8> for HolepunchMessageType {
    type Error = HolepunchError;

    fn try_from(value: u8) -> Result<Self, HolepunchError> {
        match value {
            0x00 => Ok(HolepunchMessageType::Rendezvous),
            0x01 => Ok(HolepunchMessageType::Connect),
            0x02 => Ok(HolepunchMessageType::Error),
            _ => Err(HolepunchError::InvalidMessageType(value)),
        }
    }
}

/// Error codes carried by `Error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HolepunchErrorCode {
    NoSuchPeer = 0x01,
    NotConnected = 0x02,
    NoSupport = 0x03,
    NoSelf = 0x04,
}

impl TryFrom<u32> for HolepunchErrorCode {
    type Error = HolepunchError;

    fn try_from(value: u32) -> Result<Self, HolepunchError> {
        match value {
            0x01 => Ok(HolepunchErrorCode::NoSuchPeer),
            0x02 => Ok(HolepunchErrorCode::NotConnected),
            0x03 => Ok(HolepunchErrorCode::NoSupport),
            0x04 => Ok(HolepunchErrorCode::NoSelf),
            _ => Err(HolepunchError::InvalidErrorCode(value)),
        }
    }
}

#[derive(Debug, Error)]
pub enum HolepunchError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("invalid address type: {0}")]
    InvalidAddrType(u8),

    #[error("invalid error code: {0}")]
    InvalidErrorCode(u32),

    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort { expected: usize, actual: usize },
}

/// A holepunch protocol message.
///
/// Wire format: 1 byte message type, 1 byte address family (0 = IPv4,
/// 1 = IPv6), the address, 2 bytes port, 4 bytes error code, all
/// big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolepunchMessage {
    pub msg_type: HolepunchMessageType,
    pub addr: SocketAddr,
    pub err_code: u32,
}

const ADDR_TYPE_V4: u8 = 0x00;
const ADDR_TYPE_V6: u8 = 0x01;

impl HolepunchMessage {
    /// A rendezvous request naming the unreachable target.
    pub fn rendezvous(target: SocketAddr) -> Self {
        Self {
            msg_type: HolepunchMessageType::Rendezvous,
            addr: target,
            err_code: 0,
        }
    }

    /// A connect instruction naming the peer to dial.
    pub fn connect(peer: SocketAddr) -> Self {
        Self {
            msg_type: HolepunchMessageType::Connect,
            addr: peer,
            err_code: 0,
        }
    }

    pub fn error(addr: SocketAddr, code: HolepunchErrorCode) -> Self {
        Self {
            msg_type: HolepunchMessageType::Error,
            addr,
            err_code: code as u32,
        }
    }

    pub fn encode(&self) -> Bytes {
        let size = if self.addr.is_ipv6() { 24 } else { 12 };
        let mut buf = BytesMut::with_capacity(size);

        buf.put_u8(self.msg_type as u8);
        match self.addr.ip() {
            IpAddr::V4(ip) => {
                buf.put_u8(ADDR_TYPE_V4);
                buf.put_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                buf.put_u8(ADDR_TYPE_V6);
                buf.put_slice(&ip.octets());
            }
        }
        buf.put_u16(self.addr.port());
        buf.put_u32(self.err_code);

        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, HolepunchError> {
        if data.len() < 12 {
            return Err(HolepunchError::MessageTooShort {
                expected: 12,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let msg_type = HolepunchMessageType::try_from(buf.get_u8())?;

        let ip = match buf.get_u8() {
            ADDR_TYPE_V4 => {
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            ADDR_TYPE_V6 => {
                if data.len() < 24 {
                    return Err(HolepunchError::MessageTooShort {
                        expected: 24,
                        actual: data.len(),
                    });
                }
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            other => return Err(HolepunchError::InvalidAddrType(other)),
        };

        let port = buf.get_u16();
        let err_code = buf.get_u32();

        Ok(Self {
            msg_type,
            addr: SocketAddr::new(ip, port),
            err_code,
        })
    }

    pub fn is_connect(&self) -> bool {
        self.msg_type == HolepunchMessageType::Connect
    }

    /// The error code, for `Error` messages with a known code.
    pub fn error_code(&self) -> Option<HolepunchErrorCode> {
        if self.msg_type == HolepunchMessageType::Error {
            HolepunchErrorCode::try_from(self.err_code).ok()
        } else {
            None
        }
    }
}
