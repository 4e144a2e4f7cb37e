//! Protocol constants and tuning parameters.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &str = "-LP0001-";

/// Default BitTorrent listen port
pub const DEFAULT_PORT: u16 = 6881;

// ============================================================================
// Peer connections
// ============================================================================

/// Dial timeout for outgoing peer connections
pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Write timeout for handshake and wire messages
pub const PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of the BitTorrent handshake message
pub const HANDSHAKE_LEN: usize = 68;

/// Extension message id conventionally assigned to ut_holepunch (BEP-55)
pub const HOLEPUNCH_EXTENSION_ID: u8 = 4;

// ============================================================================
// UDP tracker protocol (BEP-15)
// ============================================================================

/// Magic constant opening every tracker connect request
pub const TRACKER_PROTOCOL_MAGIC: u64 = 0x41727101980;

/// Bound on the wait for a tracker connect response
pub const TRACKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Number of peers requested per announce
pub const TRACKER_NUM_WANT: u32 = 50;
