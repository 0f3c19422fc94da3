//! # Error Kinds
//!
//! Every fallible operation in the library returns [`Error`]. The variants
//! follow how the downloader reacts to a failure:
//!
//! - **Transport** (`Io`, `Timeout`): the connection is unusable, the worker
//!   gives its piece back and exits.
//! - **Protocol**: the peer broke handshake or bitfield sequencing.
//! - **Format**: a message payload was malformed.
//! - **Integrity**: a piece did not hash to its expected digest, the worker
//!   keeps its connection and moves on to another piece.

use thiserror::Error;

/// Errors raised by the peer protocol engine and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport read/write/connect failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded network operation did not finish before its deadline.
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// Malformed or unexpected handshake/bitfield sequencing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed message payload.
    #[error("format error: {0}")]
    Format(String),

    /// Piece content does not match its expected digest.
    #[error("piece {0} failed integrity check")]
    Integrity(u32),

    /// The .torrent file could not be read or decoded.
    #[error("metainfo error: {0}")]
    Metainfo(String),

    /// No tracker could supply usable peers.
    #[error("tracker error: {0}")]
    Tracker(String),

    /// A piece exhausted its attempt budget.
    #[error("piece {0} stalled after too many failed attempts")]
    Stalled(u32),

    /// Every worker exited before the download completed.
    #[error("no peers left to download from")]
    NoPeers,
}

impl Error {
    /// Whether this error leaves the underlying connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Timeout(_))
    }

    /// Map an I/O error raised under a socket timeout to [`Error::Timeout`].
    pub(crate) fn from_io(err: std::io::Error, during: &'static str) -> Error {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                Error::Timeout(during)
            }
            _ => Error::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn transport_classification() {
        assert!(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_transport());
        assert!(Error::Timeout("reading").is_transport());
        assert!(!Error::Integrity(3).is_transport());
        assert!(!Error::Format("short".into()).is_transport());
        assert!(!Error::Protocol("expected bitfield".into()).is_transport());
    }

    #[test]
    fn timeouts_are_recognised() {
        let err = Error::from_io(io::Error::from(io::ErrorKind::WouldBlock), "reading message");
        assert!(matches!(err, Error::Timeout("reading message")));

        let err = Error::from_io(io::Error::from(io::ErrorKind::UnexpectedEof), "reading message");
        assert!(matches!(err, Error::Io(_)));
    }
}
