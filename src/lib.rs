//! limpet - a BitTorrent protocol core
//!
//! This library implements the connection-establishment and wire-protocol
//! heart of a BitTorrent client: how a peer connection is obtained across
//! hostile NATs, how a tracker announce is performed over UDP, and the two
//! codecs everything else is built on.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding and a builder-style encoder
//! - [`peer`] - Connection establishment with TCP/uTP/holepunch fallback,
//!   handshake and bitfield wire formats, peer session state
//! - [`tracker`] - BEP-15 UDP tracker client with connection-id lifecycle
//! - [`session`] - Torrent-level shared state: statistics, peer table,
//!   local client identity
//! - [`constants`] - Protocol constants and tuning parameters
//!
//! Network transports appear as injectable seams ([`peer::Dialer`],
//! [`tracker::DatagramSender`]); a TCP dialer and a UDP sender ship here,
//! while uTP and inbound datagram dispatch belong to the embedding client.

pub mod bencode;
pub mod constants;
pub mod peer;
pub mod session;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Encoder, Value};
pub use peer::{
    Dialer, Handshake, HolepunchMessage, PeerChannel, PeerDownloader, PeerError, PeerId,
    PeerSession, PieceSet, TcpDialer,
};
pub use session::{ServiceContext, TorrentSession, TransferStats};
pub use tracker::{DatagramSender, TrackerError, TrackerEvent, UdpSender, UdpTrackerClient};
