//! # BitTorrent Peer Addresses
//!
//! Trackers answer with a "compact" peer list made of 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both fields are in network byte order.

use crate::error::{Error, Result};

use byteorder::{BigEndian, ByteOrder};

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

const PEER_SIZE: usize = 6;

/// Network address of a remote peer. Two peers are equal when both IP and
/// port match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    /// IPv4 address of the peer
    pub ip: Ipv4Addr,
    /// Port number for connecting to the peer
    pub port: u16,
}

impl Peer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Peer {
        Peer { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parses a compact peer list into peer addresses, preserving order.
///
/// # Errors
///
/// Returns [`Error::Tracker`] if the list length is not a multiple of 6 bytes.
pub fn parse_compact_peers(tracker_peers: &[u8]) -> Result<Vec<Peer>> {
    if tracker_peers.len() % PEER_SIZE != 0 {
        return Err(Error::Tracker(format!(
            "compact peer list of {} bytes is not a multiple of {}",
            tracker_peers.len(),
            PEER_SIZE
        )));
    }

    let peers = tracker_peers
        .chunks_exact(PEER_SIZE)
        .map(|entry| {
            let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
            let port = BigEndian::read_u16(&entry[4..6]);
            Peer::new(ip, port)
        })
        .collect();

    Ok(peers)
}
