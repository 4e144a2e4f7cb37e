use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::error::PeerError;
use super::holepunch::HolepunchMessage;
use super::message::{extended_frame, Handshake};
use crate::constants::{HOLEPUNCH_EXTENSION_ID, PEER_CONNECT_TIMEOUT, PEER_WRITE_TIMEOUT};

/// An established transport to a peer.
///
/// The session owns its channel (`Arc<dyn PeerChannel>`); downloaders and
/// relay lookups borrow it. A channel never references its session back.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Sends the 68-byte protocol handshake.
    async fn send_handshake(&self, handshake: &Handshake) -> Result<(), PeerError>;

    /// Asks this peer, acting as relay, to broker a holepunch with
    /// `target`.
    async fn send_rendezvous(&self, target: SocketAddr) -> Result<(), PeerError>;

    /// Shuts the transport down. Further sends fail with
    /// [`PeerError::ConnectionClosed`].
    async fn close(&self) -> Result<(), PeerError>;
}

/// Dials one kind of transport toward a peer.
///
/// Implementations exist for TCP here and for uTP in the embedding client;
/// the establisher only sees this seam.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Attempts a connection. `None` means this strategy failed; the
    /// caller decides what to try next.
    async fn dial(&self, addr: SocketAddr) -> Option<Arc<dyn PeerChannel>>;
}

/// Direct TCP dialer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: SocketAddr) -> Option<Arc<dyn PeerChannel>> {
        match timeout(PEER_CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Some(Arc::new(TcpChannel::new(stream))),
            Ok(Err(e)) => {
                debug!(peer = %addr, error = %e, "tcp connect failed");
                None
            }
            Err(_) => {
                debug!(peer = %addr, "tcp connect timed out");
                None
            }
        }
    }
}

/// A peer channel over a TCP stream.
pub struct TcpChannel {
    stream: tokio::sync::Mutex<Option<TcpStream>>,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: tokio::sync::Mutex::new(Some(stream)),
        }
    }

    async fn write_all(&self, data: &[u8]) -> Result<(), PeerError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(PeerError::ConnectionClosed)?;
        timeout(PEER_WRITE_TIMEOUT, stream.write_all(data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }
}

#[async_trait]
impl PeerChannel for TcpChannel {
    async fn send_handshake(&self, handshake: &Handshake) -> Result<(), PeerError> {
        self.write_all(&handshake.encode()).await
    }

    async fn send_rendezvous(&self, target: SocketAddr) -> Result<(), PeerError> {
        let payload = HolepunchMessage::rendezvous(target).encode();
        let frame = extended_frame(HOLEPUNCH_EXTENSION_ID, &payload);
        self.write_all(&frame).await
    }

    async fn close(&self) -> Result<(), PeerError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
