use std::sync::Arc;

use tracing::{debug, error, warn};

use super::message::Handshake;
use super::session::{flags, status, PeerSession};
use super::transport::Dialer;
use crate::session::{ServiceContext, TorrentSession};

/// Establishes an outgoing connection to one peer and owns its lifecycle.
///
/// Strategies run strictly in order: a direct dial on the peer's preferred
/// transport, a relayed holepunch rendezvous, then one datagram retry. A
/// successful earlier strategy short-circuits the rest. The outcome is a
/// plain bool either way; failed attempts bump the session's failure
/// counter and are otherwise ordinary control flow.
pub struct PeerDownloader<S, D> {
    peer: Arc<PeerSession>,
    torrent: Arc<TorrentSession>,
    context: Arc<ServiceContext>,
    stream: S,
    datagram: D,
    available: bool,
}

impl<S: Dialer, D: Dialer> PeerDownloader<S, D> {
    pub fn new(
        peer: Arc<PeerSession>,
        torrent: Arc<TorrentSession>,
        context: Arc<ServiceContext>,
        stream: S,
        datagram: D,
    ) -> Self {
        Self {
            peer,
            torrent,
            context,
            stream,
            datagram,
            available: false,
        }
    }

    /// Connects and sends the protocol handshake.
    ///
    /// Returns false without sending anything when no strategy produced a
    /// connection; the failure is recorded on the peer session.
    pub async fn handshake(&mut self) -> bool {
        let ok = self.connect().await;
        if ok {
            let handshake = Handshake::new(
                *self.torrent.info_hash(),
                *self.context.peer_id().as_bytes(),
            );
            if let Some(channel) = self.peer.channel() {
                if let Err(e) = channel.send_handshake(&handshake).await {
                    warn!(peer = %self.peer.addr(), error = %e, "handshake send failed");
                }
            }
            self.peer.status_on(status::DOWNLOAD);
        } else {
            self.peer.record_failure();
        }
        self.available = ok;
        ok
    }

    /// True once a handshake completed and the connection is usable for
    /// data exchange.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Tries the direct strategy for the peer's preferred transport, then
    /// the holepunch fallback with a datagram retry.
    async fn connect(&mut self) -> bool {
        let addr = self.peer.addr();
        if self.peer.supports_utp() {
            debug!(peer = %addr, "peer connect (utp)");
            if let Some(channel) = self.datagram.dial(addr).await {
                self.peer.attach_channel(channel);
                return true;
            }
        } else {
            debug!(peer = %addr, "peer connect (tcp)");
            if let Some(channel) = self.stream.dial(addr).await {
                self.peer.attach_channel(channel);
                return true;
            }
        }
        self.holepunch_connect(true).await
    }

    /// Relayed holepunch, then an optional last-resort datagram dial.
    ///
    /// The relay path only applies to peers that are not directly
    /// reachable, and needs a live, holepunch-capable PEX introducer plus
    /// holepunch support on the target itself. Until the relay's connect
    /// instruction arrives the attempt is inconclusive, not failed.
    async fn holepunch_connect(&mut self, datagram_retry: bool) -> bool {
        let addr = self.peer.addr();

        if !self.peer.is_connectable() {
            let relay = self
                .peer
                .pex_source()
                .and_then(|source| self.torrent.peer(source));

            if let Some(relay) = relay {
                if relay.supports_holepunch()
                    && relay.is_connected()
                    && self.peer.supports_holepunch()
                {
                    if let Some(relay_channel) = relay.channel() {
                        if !self.peer.holepunch_signalled() {
                            debug!(peer = %addr, relay = %relay.addr(), "holepunch rendezvous");
                            if let Err(e) = relay_channel.send_rendezvous(addr).await {
                                warn!(relay = %relay.addr(), error = %e, "rendezvous send failed");
                            }
                        }
                        if self.peer.holepunch_signalled() {
                            debug!(peer = %addr, "peer connect (utp) (holepunch)");
                            if let Some(channel) = self.datagram.dial(addr).await {
                                self.peer.attach_channel(channel);
                                return true;
                            }
                            return false;
                        }
                        debug!(peer = %addr, "no holepunch connect signal yet");
                    }
                }
            }
        }

        if datagram_retry {
            debug!(peer = %addr, "peer connect (utp) (retry)");
            if let Some(channel) = self.datagram.dial(addr).await {
                self.peer.set_flags(flags::UTP | flags::CONNECTABLE);
                self.peer.attach_channel(channel);
                return true;
            }
        }

        false
    }

    /// Tears the connection down and detaches from the session.
    ///
    /// Safe to call repeatedly. Transport shutdown runs only if the
    /// connection ever became available; its errors are logged, and the
    /// status flag and channel slot are cleared no matter what.
    pub async fn release(&mut self) {
        if self.available {
            self.available = false;
            debug!(peer = %self.peer.addr(), "peer downloader closing");
            if let Some(channel) = self.peer.channel() {
                if let Err(e) = channel.close().await {
                    error!(peer = %self.peer.addr(), error = %e, "peer downloader close failed");
                }
            }
        }
        self.peer.status_off(status::DOWNLOAD);
        self.peer.clear_channel();
    }
}
