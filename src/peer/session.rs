use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::transport::PeerChannel;

/// Capability flags, using the BEP-11 PEX flag byte layout so values learned
/// from PEX messages apply directly.
pub mod flags {
    /// Peer prefers encrypted connections.
    pub const PREFER_ENCRYPTION: u8 = 0x01;
    /// Peer is a seed or upload-only.
    pub const SEED_UPLOAD: u8 = 0x02;
    /// Peer supports uTP.
    pub const UTP: u8 = 0x04;
    /// Peer supports the ut_holepunch extension.
    pub const HOLEPUNCH: u8 = 0x08;
    /// Peer is reachable by direct outgoing connection.
    pub const CONNECTABLE: u8 = 0x10;
}

/// Runtime status bits, distinct from capabilities.
pub mod status {
    /// A downloader currently holds this peer.
    pub const DOWNLOAD: u8 = 0x02;
}

#[derive(Default)]
struct Inner {
    flags: u8,
    status: u8,
    channel: Option<Arc<dyn PeerChannel>>,
    pex_source: Option<SocketAddr>,
    holepunch_signalled: bool,
}

/// State for one remote peer.
///
/// Mutated by the active downloader (flags, channel slot) and by protocol
/// handlers on capability discovery; read concurrently by reporting code.
/// All mutable state sits in one small record behind a short-lived lock,
/// except the failure counter, which is readable without it.
///
/// The session owns its live channel; downloaders and relays borrow it.
pub struct PeerSession {
    addr: SocketAddr,
    failures: AtomicU32,
    inner: Mutex<Inner>,
}

impl PeerSession {
    pub fn new(addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            addr,
            failures: AtomicU32::new(0),
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Creates a session for a peer learned through PEX, remembering the
    /// introducing peer's address for holepunch relaying.
    pub fn from_pex(addr: SocketAddr, source: SocketAddr, pex_flags: u8) -> Arc<Self> {
        let session = Self::new(addr);
        {
            let mut inner = session.inner.lock();
            inner.flags = pex_flags;
            inner.pex_source = Some(source);
        }
        session
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    // --- capabilities ---

    /// ORs `mask` into the capability flags.
    pub fn set_flags(&self, mask: u8) {
        self.inner.lock().flags |= mask;
    }

    pub fn has_flags(&self, mask: u8) -> bool {
        self.inner.lock().flags & mask == mask
    }

    pub fn supports_utp(&self) -> bool {
        self.has_flags(flags::UTP)
    }

    pub fn supports_holepunch(&self) -> bool {
        self.has_flags(flags::HOLEPUNCH)
    }

    pub fn is_connectable(&self) -> bool {
        self.has_flags(flags::CONNECTABLE)
    }

    // --- status ---

    pub fn status_on(&self, mask: u8) {
        self.inner.lock().status |= mask;
    }

    pub fn status_off(&self, mask: u8) {
        self.inner.lock().status &= !mask;
    }

    pub fn has_status(&self, mask: u8) -> bool {
        self.inner.lock().status & mask == mask
    }

    // --- failure accounting ---

    /// Records a connection failure; the owning session uses the count for
    /// eviction.
    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    // --- active connection ---

    pub fn attach_channel(&self, channel: Arc<dyn PeerChannel>) {
        self.inner.lock().channel = Some(channel);
    }

    pub fn channel(&self) -> Option<Arc<dyn PeerChannel>> {
        self.inner.lock().channel.clone()
    }

    pub fn clear_channel(&self) {
        self.inner.lock().channel = None;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().channel.is_some()
    }

    // --- holepunch relaying ---

    /// The address of the peer that introduced this one over PEX, if any.
    pub fn pex_source(&self) -> Option<SocketAddr> {
        self.inner.lock().pex_source
    }

    pub fn set_pex_source(&self, source: SocketAddr) {
        self.inner.lock().pex_source = Some(source);
    }

    /// True once the relay's holepunch `connect` instruction has arrived
    /// for this peer.
    pub fn holepunch_signalled(&self) -> bool {
        self.inner.lock().holepunch_signalled
    }

    /// Called by the inbound message handler on receipt of the relay's
    /// `connect` instruction.
    pub fn mark_holepunch_signalled(&self) {
        self.inner.lock().holepunch_signalled = true;
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PeerSession")
            .field("addr", &self.addr)
            .field("flags", &inner.flags)
            .field("status", &inner.status)
            .field("failures", &self.failures())
            .field("connected", &inner.channel.is_some())
            .finish()
    }
}
