use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use rand::Rng as _;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, error};

use super::error::TrackerError;
use crate::constants::{TRACKER_CONNECT_TIMEOUT, TRACKER_NUM_WANT, TRACKER_PROTOCOL_MAGIC};
use crate::session::{ServiceContext, TorrentSession};

const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;

/// Announce event codes (BEP-15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    None,
    Completed,
    Started,
    Stopped,
}

impl TrackerEvent {
    pub fn as_udp_id(self) -> u32 {
        match self {
            TrackerEvent::None => 0,
            TrackerEvent::Completed => 1,
            TrackerEvent::Started => 2,
            TrackerEvent::Stopped => 3,
        }
    }
}

/// Sends one datagram toward a tracker.
///
/// The shared tracker socket implements this; tests inject recorders.
#[async_trait]
pub trait DatagramSender: Send + Sync {
    async fn send(&self, payload: &[u8], addr: SocketAddr) -> Result<(), TrackerError>;
}

/// The shared UDP socket tracker exchanges go out on.
pub struct UdpSender {
    socket: Arc<UdpSocket>,
}

impl UdpSender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl DatagramSender for UdpSender {
    async fn send(&self, payload: &[u8], addr: SocketAddr) -> Result<(), TrackerError> {
        self.socket.send_to(payload, addr).await?;
        Ok(())
    }
}

/// UDP tracker client (BEP-15).
///
/// Holds the per-tracker connection id, a capability token the tracker
/// issues in response to a connect request and demands on every announce.
/// Callers serialize exchanges on one instance; the id handshake keeps a
/// single pending-response slot, woken by the inbound dispatcher through
/// [`on_connection_id`](UdpTrackerClient::on_connection_id).
pub struct UdpTrackerClient<S> {
    addr: SocketAddr,
    context: Arc<ServiceContext>,
    sender: S,
    transaction_id: u32,
    connection_id: Mutex<Option<i64>>,
    id_received: Notify,
}

impl<S: DatagramSender> UdpTrackerClient<S> {
    pub fn new(addr: SocketAddr, context: Arc<ServiceContext>, sender: S) -> Self {
        Self {
            addr,
            context,
            sender,
            transaction_id: rand::rng().random(),
            connection_id: Mutex::new(None),
            id_received: Notify::new(),
        }
    }

    /// Creates a client from a `udp://host:port[/announce]` URL and fires
    /// an initial connect request, so the id is often already present by
    /// the first announce.
    pub async fn from_url(
        url: &str,
        context: Arc<ServiceContext>,
        sender: S,
    ) -> Result<Self, TrackerError> {
        let client = Self::new(parse_udp_url(url)?, context, sender);
        client.request_connection_id().await?;
        Ok(client)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The transaction id this client stamps on connect requests; the
    /// inbound dispatcher routes connect responses by it.
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    pub fn connection_id(&self) -> Option<i64> {
        *self.connection_id.lock()
    }

    /// Announces event `started`.
    ///
    /// Acquires a connection id first if none is held: one more connect
    /// request goes out, and the caller blocks until the dispatcher
    /// delivers the id or the protocol timeout elapses. Failing that
    /// single retry is a hard error; everything after is a plain send.
    pub async fn announce(
        &self,
        transaction_id: u32,
        torrent: &TorrentSession,
    ) -> Result<(), TrackerError> {
        if self.connection_id().is_none() {
            let notified = self.id_received.notified();
            self.request_connection_id().await?;
            if self.connection_id().is_none()
                && timeout(TRACKER_CONNECT_TIMEOUT, notified).await.is_err()
            {
                debug!(tracker = %self.addr, "connect response timed out");
            }
        }

        let Some(connection_id) = self.connection_id() else {
            return Err(TrackerError::ConnectionId);
        };

        let message = self.announce_message(connection_id, transaction_id, torrent, TrackerEvent::Started);
        self.send(&message).await
    }

    /// Notifies the tracker the torrent finished. Best effort: skipped
    /// without a connection id, and send failures are only logged.
    pub async fn complete(&self, transaction_id: u32, torrent: &TorrentSession) {
        self.notify_event(transaction_id, torrent, TrackerEvent::Completed)
            .await;
    }

    /// Notifies the tracker the torrent stopped. Best effort, like
    /// [`complete`](UdpTrackerClient::complete).
    pub async fn stop(&self, transaction_id: u32, torrent: &TorrentSession) {
        self.notify_event(transaction_id, torrent, TrackerEvent::Stopped)
            .await;
    }

    /// Reserved.
    pub async fn scrape(
        &self,
        _transaction_id: u32,
        _torrent: &TorrentSession,
    ) -> Result<(), TrackerError> {
        Err(TrackerError::Unsupported)
    }

    /// Called by the inbound dispatcher when the connect response for this
    /// client's transaction id arrives. Stores the id and wakes a blocked
    /// announce.
    pub fn on_connection_id(&self, connection_id: i64) {
        *self.connection_id.lock() = Some(connection_id);
        self.id_received.notify_one();
    }

    async fn notify_event(&self, transaction_id: u32, torrent: &TorrentSession, event: TrackerEvent) {
        let Some(connection_id) = self.connection_id() else {
            return;
        };
        let message = self.announce_message(connection_id, transaction_id, torrent, event);
        if let Err(e) = self.send(&message).await {
            error!(tracker = %self.addr, event = ?event, error = %e, "tracker notice failed");
        }
    }

    async fn request_connection_id(&self) -> Result<(), TrackerError> {
        self.send(&build_connect(self.transaction_id)).await
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TrackerError> {
        self.sender.send(payload, self.addr).await
    }

    fn announce_message(
        &self,
        connection_id: i64,
        transaction_id: u32,
        torrent: &TorrentSession,
        event: TrackerEvent,
    ) -> Bytes {
        let stats = torrent.stats();
        build_announce(
            connection_id,
            transaction_id,
            torrent.info_hash(),
            self.context.peer_id().as_bytes(),
            stats.downloaded(),
            stats.left(),
            stats.uploaded(),
            event,
            self.context.port(),
        )
    }
}

/// Builds the 16-byte connect request.
pub fn build_connect(transaction_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_u64(TRACKER_PROTOCOL_MAGIC);
    buf.put_u32(ACTION_CONNECT);
    buf.put_u32(transaction_id);
    buf.freeze()
}

/// Builds the 98-byte announce request.
#[allow(clippy::too_many_arguments)]
pub fn build_announce(
    connection_id: i64,
    transaction_id: u32,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    downloaded: u64,
    left: u64,
    uploaded: u64,
    event: TrackerEvent,
    port: u16,
) -> Bytes {
    let key: u32 = rand::rng().random();

    let mut buf = BytesMut::with_capacity(98);
    buf.put_i64(connection_id);
    buf.put_u32(ACTION_ANNOUNCE);
    buf.put_u32(transaction_id);
    buf.put_slice(info_hash);
    buf.put_slice(peer_id);
    buf.put_u64(downloaded);
    buf.put_u64(left);
    buf.put_u64(uploaded);
    buf.put_u32(event.as_udp_id());
    buf.put_u32(0); // IP address (0 = let the tracker read it)
    buf.put_u32(key);
    buf.put_u32(TRACKER_NUM_WANT);
    buf.put_u16(port);
    buf.freeze()
}

/// Resolves a `udp://host:port[/path]` tracker URL to a socket address.
pub fn parse_udp_url(url: &str) -> Result<SocketAddr, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let authority = rest.split('/').next().unwrap_or(rest);

    authority
        .parse()
        .map_err(|_| TrackerError::InvalidUrl(url.to_string()))
}
