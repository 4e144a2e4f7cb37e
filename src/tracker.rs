//! UDP tracker protocol (BEP-15).
//!
//! Trackers hand out peers in exchange for announces. The UDP flavor is a
//! stateless binary protocol guarded by a connection id: a client first
//! sends a connect request, the tracker answers with an id, and every
//! subsequent announce must carry it. [`UdpTrackerClient`] manages that id
//! lifecycle and builds the fixed-width request datagrams; receiving and
//! routing responses belongs to the embedding client's dispatcher.

mod error;
mod udp;

pub use error::TrackerError;
pub use udp::{
    build_announce, build_connect, parse_udp_url, DatagramSender, TrackerEvent, UdpSender,
    UdpTrackerClient,
};
