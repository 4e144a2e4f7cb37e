use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::bitfield::{self, PieceSet};
use super::*;
use crate::session::{ServiceContext, TorrentSession};

// --- bitfield ---

#[test]
fn test_piece_set_basics() {
    let mut pieces = PieceSet::new();
    assert!(pieces.is_empty());
    assert!(!pieces.has(0));

    pieces.set(0);
    pieces.set(99);
    assert!(pieces.has(0));
    assert!(pieces.has(99));
    assert!(!pieces.has(50));
    assert_eq!(pieces.count(), 2);

    pieces.clear(99);
    assert!(!pieces.has(99));
    assert_eq!(pieces.count(), 1);
}

#[test]
fn test_piece_set_le_bytes() {
    let pieces: PieceSet = [0, 9].into_iter().collect();
    assert_eq!(pieces.to_le_bytes(), vec![0x01, 0x02]);
    assert_eq!(PieceSet::from_le_bytes(&[0x01, 0x02]), pieces);

    // Trailing unset pieces occupy no space.
    assert!(PieceSet::new().to_le_bytes().is_empty());
}

#[test]
fn test_reverse_bits_self_inverse() {
    for value in 0..=255u8 {
        assert_eq!(bitfield::reverse_bits(bitfield::reverse_bits(value)), value);
    }
    assert_eq!(bitfield::reverse_bits(0b0000_0001), 0b1000_0000);
    assert_eq!(bitfield::reverse_bits(0b0100_0001), 0b1000_0010);
}

#[test]
fn test_bitfield_wire_layout() {
    // Piece 0 is the high bit of byte 0; piece 8 the high bit of byte 1.
    let pieces: PieceSet = [0, 8].into_iter().collect();
    assert_eq!(&bitfield::to_wire(9, &pieces)[..], &[0x80, 0x80]);

    let pieces: PieceSet = [6].into_iter().collect();
    assert_eq!(&bitfield::to_wire(7, &pieces)[..], &[0x02]);

    // One held piece out of a thousand still fills ceil(1000/8) bytes.
    let pieces: PieceSet = [0].into_iter().collect();
    let wire = bitfield::to_wire(1000, &pieces);
    assert_eq!(wire.len(), 125);
    assert_eq!(wire[0], 0x80);
    assert!(wire[1..].iter().all(|&b| b == 0));
}

#[test]
fn test_bitfield_roundtrip() {
    for n in [1usize, 7, 8, 9, 64, 1000] {
        let subsets: Vec<PieceSet> = vec![
            PieceSet::new(),
            [0].into_iter().collect(),
            [n - 1].into_iter().collect(),
            (0..n).step_by(3).collect(),
            (0..n).collect(),
        ];

        for pieces in subsets {
            let wire = bitfield::to_wire(n, &pieces);
            assert_eq!(wire.len(), n.div_ceil(8));
            assert_eq!(bitfield::from_wire(&wire), pieces, "piece count {}", n);
        }
    }
}

#[test]
fn test_bitfield_frame() {
    let pieces: PieceSet = [0].into_iter().collect();
    let frame = bitfield_frame(8, &pieces);
    assert_eq!(&frame[..], &[0, 0, 0, 2, 5, 0x80]);
}

#[test]
fn test_extended_frame() {
    let frame = extended_frame(4, &[1, 2, 3]);
    assert_eq!(&frame[..], &[0, 0, 0, 5, 20, 4, 1, 2, 3]);
}

// --- handshake ---

#[test]
fn test_handshake_encode_decode() {
    let handshake = Handshake::new([1u8; 20], [2u8; 20]);
    let encoded = handshake.encode();
    assert_eq!(encoded.len(), crate::constants::HANDSHAKE_LEN);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, [1u8; 20]);
    assert_eq!(decoded.peer_id, [2u8; 20]);
    assert!(decoded.supports_extension_protocol());
    assert!(decoded.supports_fast_extension());
}

#[test]
fn test_handshake_rejects_garbage() {
    assert!(Handshake::decode(&[0u8; 68]).is_err());
    assert!(Handshake::decode(&[19u8; 10]).is_err());
}

// --- holepunch messages ---

#[test]
fn test_holepunch_roundtrip_v4() {
    let addr: SocketAddr = "192.168.1.1:6881".parse().unwrap();
    let msg = HolepunchMessage::rendezvous(addr);

    let encoded = msg.encode();
    assert_eq!(encoded.len(), 12);

    let decoded = HolepunchMessage::decode(&encoded).unwrap();
    assert_eq!(decoded, msg);
    assert!(!decoded.is_connect());
}

#[test]
fn test_holepunch_roundtrip_v6() {
    let addr: SocketAddr = "[2001:4860::8888]:6881".parse().unwrap();
    let msg = HolepunchMessage::connect(addr);

    let encoded = msg.encode();
    assert_eq!(encoded.len(), 24);

    let decoded = HolepunchMessage::decode(&encoded).unwrap();
    assert_eq!(decoded.addr, addr);
    assert!(decoded.is_connect());
}

#[test]
fn test_holepunch_error_code() {
    let addr: SocketAddr = "10.0.0.1:51413".parse().unwrap();
    let msg = HolepunchMessage::error(addr, HolepunchErrorCode::NotConnected);

    let decoded = HolepunchMessage::decode(&msg.encode()).unwrap();
    assert_eq!(decoded.error_code(), Some(HolepunchErrorCode::NotConnected));
}

#[test]
fn test_holepunch_too_short() {
    assert!(matches!(
        HolepunchMessage::decode(&[0x00, 0x00]),
        Err(HolepunchError::MessageTooShort { .. })
    ));
}

// --- peer id ---

#[test]
fn test_peer_id_generate() {
    let a = PeerId::generate();
    let b = PeerId::generate();
    assert_ne!(a.0, b.0);
    assert_eq!(a.client_id(), Some("LP0001"));
    assert!(PeerId::from_bytes(&[0u8; 19]).is_none());
}

// --- peer session ---

#[test]
fn test_session_flags_and_status() {
    let addr: SocketAddr = "10.0.0.1:6881".parse().unwrap();
    let session = PeerSession::new(addr);

    assert!(!session.supports_utp());
    session.set_flags(flags::UTP | flags::HOLEPUNCH);
    assert!(session.supports_utp());
    assert!(session.supports_holepunch());
    assert!(!session.is_connectable());

    session.status_on(status::DOWNLOAD);
    assert!(session.has_status(status::DOWNLOAD));
    session.status_off(status::DOWNLOAD);
    assert!(!session.has_status(status::DOWNLOAD));

    assert_eq!(session.record_failure(), 1);
    assert_eq!(session.record_failure(), 2);
    assert_eq!(session.failures(), 2);
}

#[test]
fn test_session_from_pex() {
    let addr: SocketAddr = "10.0.0.2:6881".parse().unwrap();
    let source: SocketAddr = "10.0.0.9:6881".parse().unwrap();
    let session = PeerSession::from_pex(addr, source, flags::UTP);

    assert_eq!(session.pex_source(), Some(source));
    assert!(session.supports_utp());
    assert!(!session.holepunch_signalled());
    session.mark_holepunch_signalled();
    assert!(session.holepunch_signalled());
}

// --- establisher ---

struct FakeChannel {
    handshakes: AtomicUsize,
    rendezvous: Mutex<Vec<SocketAddr>>,
    closed: AtomicUsize,
    fail_close: bool,
}

impl FakeChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            handshakes: AtomicUsize::new(0),
            rendezvous: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            fail_close: false,
        })
    }

    fn failing_close() -> Arc<Self> {
        Arc::new(Self {
            handshakes: AtomicUsize::new(0),
            rendezvous: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            fail_close: true,
        })
    }
}

#[async_trait]
impl PeerChannel for FakeChannel {
    async fn send_handshake(&self, _handshake: &Handshake) -> Result<(), PeerError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_rendezvous(&self, target: SocketAddr) -> Result<(), PeerError> {
        self.rendezvous.lock().push(target);
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(PeerError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

struct FakeDialer {
    outcomes: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: AtomicUsize,
    channel: Arc<FakeChannel>,
}

impl FakeDialer {
    fn always(succeed: bool) -> Arc<Self> {
        Self::script(&[], succeed)
    }

    fn script(outcomes: &[bool], fallback: bool) -> Arc<Self> {
        Self::with_channel(FakeChannel::new(), outcomes, fallback)
    }

    fn with_channel(channel: Arc<FakeChannel>, outcomes: &[bool], fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            fallback,
            calls: AtomicUsize::new(0),
            channel,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for Arc<FakeDialer> {
    async fn dial(&self, _addr: SocketAddr) -> Option<Arc<dyn PeerChannel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let succeed = self.outcomes.lock().pop_front().unwrap_or(self.fallback);
        if succeed {
            let channel: Arc<dyn PeerChannel> = self.channel.clone();
            Some(channel)
        } else {
            None
        }
    }
}

fn fixture() -> (Arc<TorrentSession>, Arc<ServiceContext>) {
    (
        TorrentSession::new([7u8; 20], 1 << 20),
        Arc::new(ServiceContext::new(6881)),
    )
}

fn peer_addr() -> SocketAddr {
    "10.1.1.1:6881".parse().unwrap()
}

#[tokio::test]
async fn test_direct_utp_success() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP);

    let stream = FakeDialer::always(true);
    let datagram = FakeDialer::always(true);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream.clone(),
        datagram.clone(),
    );

    assert!(downloader.handshake().await);
    assert!(downloader.is_available());
    assert_eq!(datagram.calls(), 1);
    assert_eq!(stream.calls(), 0);
    assert_eq!(datagram.channel.handshakes.load(Ordering::SeqCst), 1);
    assert!(peer.has_status(status::DOWNLOAD));
    assert!(peer.is_connected());
    assert_eq!(peer.failures(), 0);
}

#[tokio::test]
async fn test_utp_peer_gets_exactly_one_retry() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP);

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::always(false);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream.clone(),
        datagram.clone(),
    );

    assert!(!downloader.handshake().await);
    // Direct attempt plus one retry, and never a TCP dial.
    assert_eq!(datagram.calls(), 2);
    assert_eq!(stream.calls(), 0);
    assert_eq!(peer.failures(), 1);
    assert!(!peer.is_connected());
}

#[tokio::test]
async fn test_tcp_failure_falls_back_to_datagram() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::always(true);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream.clone(),
        datagram.clone(),
    );

    assert!(downloader.handshake().await);
    assert_eq!(stream.calls(), 1);
    assert_eq!(datagram.calls(), 1);
    // The retry success teaches us the peer is reachable over uTP.
    assert!(peer.supports_utp());
    assert!(peer.is_connectable());
}

fn relay_fixture(
    torrent: &TorrentSession,
    peer: &PeerSession,
) -> (Arc<PeerSession>, Arc<FakeChannel>) {
    let relay_addr: SocketAddr = "10.2.2.2:6881".parse().unwrap();
    let relay = PeerSession::new(relay_addr);
    relay.set_flags(flags::HOLEPUNCH);
    let relay_channel = FakeChannel::new();
    relay.attach_channel(relay_channel.clone());
    torrent.insert_peer(relay.clone());
    peer.set_pex_source(relay_addr);
    (relay, relay_channel)
}

#[tokio::test]
async fn test_rendezvous_sent_through_relay() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP | flags::HOLEPUNCH);
    let (_relay, relay_channel) = relay_fixture(&torrent, &peer);

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::always(false);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream.clone(),
        datagram.clone(),
    );

    assert!(!downloader.handshake().await);
    assert_eq!(relay_channel.rendezvous.lock().as_slice(), &[peer_addr()]);
    // Direct attempt, then the post-rendezvous retry.
    assert_eq!(datagram.calls(), 2);
}

#[tokio::test]
async fn test_holepunch_signal_short_circuits() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP | flags::HOLEPUNCH);
    peer.mark_holepunch_signalled();
    let (_relay, relay_channel) = relay_fixture(&torrent, &peer);

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::always(false);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream.clone(),
        datagram.clone(),
    );

    assert!(!downloader.handshake().await);
    // No rendezvous once the signal is in, and the punched dial's failure
    // is final: no extra retry after it.
    assert!(relay_channel.rendezvous.lock().is_empty());
    assert_eq!(datagram.calls(), 2);
}

#[tokio::test]
async fn test_holepunch_signal_connects() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP | flags::HOLEPUNCH);
    peer.mark_holepunch_signalled();
    let (_relay, _relay_channel) = relay_fixture(&torrent, &peer);

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::script(&[false, true], false);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream.clone(),
        datagram.clone(),
    );

    assert!(downloader.handshake().await);
    assert_eq!(datagram.calls(), 2);
    // The holepunch path reports success without relearning flags.
    assert!(!peer.is_connectable());
}

#[tokio::test]
async fn test_connectable_peer_skips_relay() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP | flags::HOLEPUNCH | flags::CONNECTABLE);
    let (_relay, relay_channel) = relay_fixture(&torrent, &peer);

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::always(false);
    let mut downloader =
        PeerDownloader::new(peer, torrent, context, stream, datagram.clone());

    assert!(!downloader.handshake().await);
    assert!(relay_channel.rendezvous.lock().is_empty());
    assert_eq!(datagram.calls(), 2);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP);

    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::always(true);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream,
        datagram.clone(),
    );

    assert!(downloader.handshake().await);
    assert!(peer.has_status(status::DOWNLOAD));

    downloader.release().await;
    assert_eq!(datagram.channel.closed.load(Ordering::SeqCst), 1);
    assert!(!peer.has_status(status::DOWNLOAD));
    assert!(!peer.is_connected());

    downloader.release().await;
    assert_eq!(datagram.channel.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tcp_dialer_sends_handshake() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; crate::constants::HANDSHAKE_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut stream, &mut buf)
            .await
            .unwrap();
        buf
    });

    let channel = TcpDialer.dial(addr).await.expect("dial failed");
    channel
        .send_handshake(&Handshake::new([1u8; 20], [2u8; 20]))
        .await
        .unwrap();

    let received = accept.await.unwrap();
    let handshake = Handshake::decode(&received).unwrap();
    assert_eq!(handshake.info_hash, [1u8; 20]);
    assert_eq!(handshake.peer_id, [2u8; 20]);

    channel.close().await.unwrap();
    assert!(channel
        .send_handshake(&Handshake::new([1u8; 20], [2u8; 20]))
        .await
        .is_err());
}

#[tokio::test]
async fn test_tcp_dialer_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(TcpDialer.dial(addr).await.is_none());
}

#[tokio::test]
async fn test_release_cleans_up_when_close_fails() {
    let (torrent, context) = fixture();
    let peer = PeerSession::new(peer_addr());
    peer.set_flags(flags::UTP);

    let channel = FakeChannel::failing_close();
    let stream = FakeDialer::always(false);
    let datagram = FakeDialer::with_channel(channel.clone(), &[], true);
    let mut downloader = PeerDownloader::new(
        peer.clone(),
        torrent,
        context,
        stream,
        datagram,
    );

    assert!(downloader.handshake().await);
    downloader.release().await;

    assert_eq!(channel.closed.load(Ordering::SeqCst), 1);
    assert!(!peer.has_status(status::DOWNLOAD));
    assert!(!peer.is_connected());
}
