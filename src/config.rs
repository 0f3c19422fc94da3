//! Download tuning knobs.

use std::time::Duration;

/// Maximum number of unacknowledged block requests per peer.
pub const MAX_BACKLOG: u32 = 5;

/// Largest block requested in one REQUEST message (16KB).
pub const MAX_BLOCK_SIZE: u32 = 16384;

/// Timeouts, pipelining and retry limits used by the downloader.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Deadline for writing our handshake and reading the peer's
    pub handshake_timeout: Duration,
    /// Deadline for the BITFIELD that must follow the handshake
    pub bitfield_timeout: Duration,
    /// Overall deadline for downloading one piece from one peer
    pub piece_timeout: Duration,
    /// Outstanding block requests allowed per connection
    pub max_backlog: u32,
    /// Size of each requested block
    pub block_size: u32,
    /// Failed verifications after which a piece is reported as stalled, `None` retries forever
    pub max_attempts: Option<u32>,
    /// Pause taken by a worker whose peer has none of the queued pieces
    pub idle_backoff: Duration,
    /// Limit on workers connecting at the same time, `None` connects to every peer at once
    pub max_connecting: Option<usize>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            piece_timeout: Duration::from_secs(30),
            max_backlog: MAX_BACKLOG,
            block_size: MAX_BLOCK_SIZE,
            max_attempts: Some(10),
            idle_backoff: Duration::from_millis(100),
            max_connecting: None,
        }
    }
}
