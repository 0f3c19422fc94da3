//! # Leech
//!
//! A BitTorrent download engine for single-file torrents.
//!
//! ## Architecture
//!
//! - **Codecs**: [`handshake`] and [`message`] speak the peer wire protocol
//! - **Connections**: [`client::Client`] owns one handshaken peer connection
//! - **Workers**: [`worker::Worker`] runs on its own thread per peer, pulling
//!   pieces from the shared [`queue::WorkQueue`] and downloading them with
//!   pipelined block requests
//! - **Orchestration**: [`download::download`] starts the workers, collects
//!   verified pieces and assembles the output buffer
//!
//! Torrent metadata ([`torrent`]) and tracker announces ([`tracker`]) feed
//! the engine with a descriptor and a peer list.
//!
//! ```no_run
//! use leech::{tracker, DownloadConfig, Torrent};
//!
//! # fn main() -> leech::Result<()> {
//! let torrent = Torrent::open("debian.iso.torrent")?;
//! let peers = tracker::request_peers(&torrent, 6881)?;
//! let data = torrent.download(&peers, &DownloadConfig::default(), &())?;
//! std::fs::write(torrent.name(), data)?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod bitfield;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod piece;
pub mod queue;
pub mod torrent;
pub mod tracker;
pub mod worker;

pub use bitfield::Bitfield;
pub use config::DownloadConfig;
pub use download::{ProgressObserver, ProgressSample};
pub use error::{Error, Result};
pub use message::Message;
pub use peer::Peer;
pub use torrent::Torrent;
