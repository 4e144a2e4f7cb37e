//! Torrent-level session state shared by peer and tracker components.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::constants::DEFAULT_PORT;
use crate::peer::{PeerId, PeerSession};

/// Live transfer statistics for one torrent.
///
/// Counters are read as snapshots at announce time; writers and readers do
/// not coordinate beyond the atomics.
#[derive(Debug)]
pub struct TransferStats {
    total_size: u64,
    downloaded: AtomicU64,
    uploaded: AtomicU64,
}

impl TransferStats {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            downloaded: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    /// Bytes still missing, as reported to trackers.
    pub fn left(&self) -> u64 {
        self.total_size.saturating_sub(self.downloaded())
    }

    pub fn add_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// One torrent's aggregate state: identity, transfer statistics, and the
/// set of known peers.
///
/// The peer table doubles as the lookup used to resolve a peer's PEX
/// introducer to a live session; a vanished introducer simply resolves to
/// nothing.
pub struct TorrentSession {
    info_hash: [u8; 20],
    stats: TransferStats,
    peers: DashMap<SocketAddr, Arc<PeerSession>>,
}

impl TorrentSession {
    pub fn new(info_hash: [u8; 20], total_size: u64) -> Arc<Self> {
        Arc::new(Self {
            info_hash,
            stats: TransferStats::new(total_size),
            peers: DashMap::new(),
        })
    }

    pub fn info_hash(&self) -> &[u8; 20] {
        &self.info_hash
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Registers a peer, returning whichever session ends up in the table.
    pub fn insert_peer(&self, session: Arc<PeerSession>) -> Arc<PeerSession> {
        self.peers
            .entry(session.addr())
            .or_insert(session)
            .value()
            .clone()
    }

    pub fn peer(&self, addr: SocketAddr) -> Option<Arc<PeerSession>> {
        self.peers.get(&addr).map(|entry| entry.value().clone())
    }

    pub fn remove_peer(&self, addr: SocketAddr) -> Option<Arc<PeerSession>> {
        self.peers.remove(&addr).map(|(_, session)| session)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// Local client identity, passed explicitly to the components that need it:
/// the tracker announce builder and the peer handshake.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    peer_id: PeerId,
    port: u16,
}

impl ServiceContext {
    pub fn new(port: u16) -> Self {
        Self {
            peer_id: PeerId::generate(),
            port,
        }
    }

    pub fn with_peer_id(peer_id: PeerId, port: u16) -> Self {
        Self { peer_id, port }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// The port remote peers dial back on.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}
