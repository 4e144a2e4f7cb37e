//! Peer wire protocol and connection establishment (BEP-3, BEP-10,
//! BEP-11, BEP-55).
//!
//! The central type is [`PeerDownloader`], which turns a [`PeerSession`]
//! into a live, handshaked connection by trying transports in a fixed
//! order: direct dial on the peer's preferred transport, relayed holepunch
//! rendezvous through the peer's PEX introducer, then one datagram retry.
//! The transport seams ([`Dialer`], [`PeerChannel`]) are traits so the
//! embedding client supplies its uTP stack and tests supply fakes.

pub mod bitfield;
mod downloader;
mod error;
mod holepunch;
mod message;
mod peer_id;
mod session;
mod transport;

pub use bitfield::PieceSet;
pub use downloader::PeerDownloader;
pub use error::PeerError;
pub use holepunch::{
    HolepunchError, HolepunchErrorCode, HolepunchMessage, HolepunchMessageType,
};
pub use message::{bitfield_frame, extended_frame, Handshake};
pub use peer_id::PeerId;
pub use session::{flags, status, PeerSession};
pub use transport::{Dialer, PeerChannel, TcpChannel, TcpDialer};

#[cfg(test)]
mod tests;
