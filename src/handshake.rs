//! # BitTorrent Handshake Protocol
//!
//! The handshake is the first exchange on every peer connection. Both sides
//! send one and the info hashes must match before any other message flows.
//!
//! ## Message Format
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte - Length of protocol string (19 for "BitTorrent protocol")
//! - **pstr**: pstrlen bytes - Protocol identifier
//! - **reserved**: 8 bytes - All zeros on send, ignored on receive
//! - **info_hash**: 20 bytes - SHA-1 hash of torrent info dictionary
//! - **peer_id**: 20 bytes - Unique identifier for the peer
//!
//! The standard handshake is therefore 68 bytes long.

use crate::error::{Error, Result};

use std::io::Read;

/// Protocol identifier sent in every outbound handshake.
pub const PROTOCOL_ID: &str = "BitTorrent protocol";

/// Fixed part of a handshake that follows the protocol identifier.
const HANDSHAKE_TAIL_LEN: usize = 8 + 20 + 20;

/// 20-byte SHA-1 hash of a torrent's info dictionary.
pub type InfoHash = [u8; 20];

/// 20-byte peer identifier exchanged in the handshake.
pub type PeerId = [u8; 20];

/// A BitTorrent handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier bytes, 1 to 255 of them
    pstr: Vec<u8>,
    /// Extension bits, zero on everything we send
    pub reserved: [u8; 8],
    /// Info hash of the torrent this connection is about
    pub info_hash: InfoHash,
    /// Identifier of the sending peer
    pub peer_id: PeerId,
}

impl Handshake {
    /// Builds a standard "BitTorrent protocol" handshake.
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Handshake {
            pstr: PROTOCOL_ID.as_bytes().to_vec(),
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }

    /// Builds a handshake with an arbitrary protocol identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `pstr` is empty or does not fit the
    /// one-byte length prefix.
    pub fn with_protocol(pstr: &str, info_hash: InfoHash, peer_id: PeerId) -> Result<Self> {
        if pstr.is_empty() || pstr.len() > u8::MAX as usize {
            return Err(Error::Protocol(format!(
                "protocol identifier of {} bytes does not fit a handshake",
                pstr.len()
            )));
        }

        Ok(Handshake {
            pstr: pstr.as_bytes().to_vec(),
            reserved: [0; 8],
            info_hash,
            peer_id,
        })
    }

    /// Protocol identifier bytes.
    pub fn pstr(&self) -> &[u8] {
        &self.pstr
    }

    /// Serializes the handshake for network transmission.
    ///
    /// The reserved bytes are always written as zeros.
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized = Vec::with_capacity(1 + self.pstr.len() + HANDSHAKE_TAIL_LEN);
        serialized.push(self.pstr.len() as u8);
        serialized.extend_from_slice(&self.pstr);
        serialized.extend_from_slice(&[0; 8]);
        serialized.extend_from_slice(&self.info_hash);
        serialized.extend_from_slice(&self.peer_id);
        serialized
    }
}

/// Reads one handshake from `reader`.
///
/// # Errors
///
/// - [`Error::Protocol`] if the declared protocol identifier length is zero
/// - [`Error::Io`] if the stream ends before the full handshake arrives
pub fn read_handshake<R: Read>(reader: &mut R) -> Result<Handshake> {
    let mut len_buf = [0; 1];
    reader.read_exact(&mut len_buf)?;

    let pstrlen = len_buf[0] as usize;
    if pstrlen == 0 {
        return Err(Error::Protocol("handshake protocol length is zero".into()));
    }

    let mut buf = vec![0; pstrlen + HANDSHAKE_TAIL_LEN];
    reader.read_exact(&mut buf)?;

    let mut reserved = [0; 8];
    reserved.copy_from_slice(&buf[pstrlen..pstrlen + 8]);
    let mut info_hash = [0; 20];
    info_hash.copy_from_slice(&buf[pstrlen + 8..pstrlen + 28]);
    let mut peer_id = [0; 20];
    peer_id.copy_from_slice(&buf[pstrlen + 28..]);

    Ok(Handshake {
        pstr: buf[..pstrlen].to_vec(),
        reserved,
        info_hash,
        peer_id,
    })
}
