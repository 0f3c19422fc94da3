//! # BitTorrent Piece Management
//!
//! Pieces are the verification units of a torrent. Each one is identified by
//! its index and checked against a SHA-1 digest from the torrent metadata.
//!
//! - **PieceWork**: A piece waiting to be downloaded, passed between the work
//!   queue and whichever worker currently holds it
//! - **PieceResult**: A verified piece ready to be copied into the output
//! - **PieceOutcome**: What a worker reports back for a piece

use crate::error::{Error, Result};

use sha1::{Digest, Sha1};

/// A piece that still has to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected SHA-1 digest of the piece
    pub hash: [u8; 20],
    /// Length of the piece in bytes
    pub length: u32,
    /// Failed verifications so far
    pub attempts: u32,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
            attempts: 0,
        }
    }

    /// Records a failed attempt. Returns true once `max_attempts` is reached.
    pub fn record_failure(&mut self, max_attempts: Option<u32>) -> bool {
        self.attempts += 1;
        matches!(max_attempts, Some(max) if self.attempts >= max)
    }
}

/// A downloaded piece whose digest has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Verified piece bytes
    pub data: Vec<u8>,
}

impl PieceResult {
    pub fn new(index: u32, data: Vec<u8>) -> PieceResult {
        PieceResult { index, data }
    }
}

/// Result published by a worker for one piece.
#[derive(Debug)]
pub enum PieceOutcome {
    /// The piece was downloaded and verified.
    Done(PieceResult),
    /// The piece failed too many times and will not be retried.
    Stalled(u32),
}

/// Checks that `data` hashes to the digest expected for piece `index`.
///
/// # Errors
///
/// Returns [`Error::Integrity`] on mismatch.
pub fn verify_integrity(index: u32, data: &[u8], expected: &[u8; 20]) -> Result<()> {
    let hash = Sha1::digest(data);
    if hash.as_slice() != expected {
        return Err(Error::Integrity(index));
    }

    debug!("Successfully verified integrity of piece {}", index);

    Ok(())
}
