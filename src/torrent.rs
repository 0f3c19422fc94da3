//! # BitTorrent Torrent Metadata
//!
//! Torrent files contain metadata in bencoded format:
//!
//! - **announce**: Tracker URL for peer discovery
//! - **announce-list**: Optional tiers of backup trackers (BEP 12)
//! - **info**: Dictionary with file information and piece hashes
//!   - **pieces**: Concatenated SHA-1 hashes, 20 bytes per piece
//!   - **piece length**: Size of each piece (the last one may be shorter)
//!   - **length**: Total file size
//!   - **name**: Suggested filename
//!
//! Only single-file torrents are supported.

use crate::config::DownloadConfig;
use crate::download::{self, ProgressObserver};
use crate::error::{Error, Result};
use crate::handshake::{InfoHash, PeerId};
use crate::peer::Peer;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_bencode::value::Value;
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use std::fs;
use std::path::Path;

// Size of SHA-1 hash in bytes
const SHA1_HASH_SIZE: usize = 20;

// Client prefix of generated peer ids, Azureus style
const PEER_ID_PREFIX: &[u8; 8] = b"-LE0100-";

/// Immutable description of a single-file torrent.
#[derive(Debug, Clone)]
pub struct Torrent {
    /// Tracker tiers for peer discovery (each tier is a list of URLs)
    tiers: Vec<Vec<String>>,
    /// 20-byte SHA-1 hash of the bencoded info dictionary
    info_hash: InfoHash,
    /// 20-byte SHA-1 hashes, one for each piece
    pieces_hashes: Vec<[u8; 20]>,
    /// Size of each piece in bytes (except possibly the last)
    piece_length: u32,
    /// Total size of the file in bytes
    length: u64,
    /// Suggested filename from torrent metadata
    name: String,
    /// 20-byte identifier of this client, random per run
    peer_id: PeerId,
}

/// BencodeInfo structure.
#[derive(Deserialize)]
struct BencodeInfo {
    // Concatenation of all pieces 20-byte SHA-1 hashes
    pieces: ByteBuf,
    // Size of each piece in bytes
    #[serde(rename = "piece length")]
    piece_length: u32,
    // Size of the file in bytes, absent for multi-file torrents
    #[serde(default)]
    length: Option<u64>,
    // Suggested filename where to save the file
    name: String,
}

/// BencodeTorrent structure.
#[derive(Deserialize)]
struct BencodeTorrent {
    // URL of the tracker
    #[serde(default)]
    announce: String,
    // List of tracker URLs
    #[serde(rename = "announce-list", default)]
    announce_list: Vec<Vec<String>>,
    // Informations about file, kept raw so its hash covers every key
    info: Value,
}

/// Generates a random 20-byte peer id.
pub fn generate_peer_id() -> PeerId {
    let mut peer_id = [0; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
    let mut rng = rand::thread_rng();
    for x in peer_id[8..].iter_mut() {
        *x = rng.gen();
    }
    peer_id
}

impl Torrent {
    /// Builds a torrent descriptor from already decoded fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metainfo`] if the piece length is zero or the number
    /// of digests does not match the number of pieces `length` spans.
    pub fn new(
        name: impl Into<String>,
        announce: impl Into<String>,
        info_hash: InfoHash,
        piece_length: u32,
        pieces_hashes: Vec<[u8; 20]>,
        length: u64,
    ) -> Result<Torrent> {
        if piece_length == 0 {
            return Err(Error::Metainfo("piece length is zero".into()));
        }
        let expected = length.div_ceil(piece_length as u64);
        if pieces_hashes.len() as u64 != expected {
            return Err(Error::Metainfo(format!(
                "{} piece hashes for {} bytes in pieces of {}",
                pieces_hashes.len(),
                length,
                piece_length
            )));
        }

        let announce = announce.into();
        let tiers = if announce.is_empty() {
            vec![]
        } else {
            vec![vec![announce]]
        };

        Ok(Torrent {
            tiers,
            info_hash,
            pieces_hashes,
            piece_length,
            length,
            name: name.into(),
            peer_id: generate_peer_id(),
        })
    }

    /// Reads and decodes a .torrent file.
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Torrent> {
        let buf = fs::read(filepath.as_ref()).map_err(|e| {
            Error::Metainfo(format!(
                "could not read {}: {}",
                filepath.as_ref().display(),
                e
            ))
        })?;
        Torrent::from_bytes(&buf)
    }

    /// Decodes bencoded torrent metadata.
    pub fn from_bytes(buf: &[u8]) -> Result<Torrent> {
        let bencode = de::from_bytes::<BencodeTorrent>(buf)
            .map_err(|e| Error::Metainfo(format!("could not decode torrent: {}", e)))?;

        let info_bytes = ser::to_bytes(&bencode.info)
            .map_err(|e| Error::Metainfo(format!("could not encode info: {}", e)))?;
        let info = de::from_bytes::<BencodeInfo>(&info_bytes)
            .map_err(|e| Error::Metainfo(format!("could not decode info: {}", e)))?;

        let length = info
            .length
            .ok_or_else(|| Error::Metainfo("multi-file torrents are not supported".into()))?;

        let mut torrent = Torrent::new(
            info.name.clone(),
            bencode.announce.clone(),
            Sha1::digest(&info_bytes).into(),
            info.piece_length,
            split_pieces_hashes(&info.pieces)?,
            length,
        )?;

        if !bencode.announce_list.is_empty() {
            // Shuffle each tier as per BEP 12
            let mut rng = rand::thread_rng();
            torrent.tiers = bencode.announce_list;
            for tier in &mut torrent.tiers {
                tier.shuffle(&mut rng);
            }
        }
        if torrent.tiers.iter().all(|tier| tier.is_empty()) {
            return Err(Error::Metainfo("torrent has no announce or announce-list".into()));
        }

        Ok(torrent)
    }

    /// Returns the suggested filename from the torrent metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    /// Total size of the content in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn pieces_hashes(&self) -> &[[u8; 20]] {
        &self.pieces_hashes
    }

    pub fn piece_count(&self) -> usize {
        self.pieces_hashes.len()
    }

    /// Primary tracker URL.
    pub fn announce(&self) -> Option<&str> {
        self.tiers.first().and_then(|tier| tier.first()).map(String::as_str)
    }

    /// Every distinct tracker URL, tier order preserved.
    pub fn tracker_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self.tiers.iter().flatten() {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }

    /// Byte range `[begin, end)` of piece `index` in the file.
    ///
    /// The final piece is clamped to the end of the file.
    pub fn piece_bounds(&self, index: u32) -> (usize, usize) {
        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.length);
        (begin as usize, end.max(begin) as usize)
    }

    /// Length of piece `index` in bytes.
    pub fn piece_len(&self, index: u32) -> u32 {
        let (begin, end) = self.piece_bounds(index);
        (end - begin) as u32
    }

    /// Download torrent from `peers`.
    pub fn download(
        &self,
        peers: &[Peer],
        config: &DownloadConfig,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<u8>> {
        download::download(self, peers, config, observer)
    }
}

/// Split bencoded pieces into 20-byte SHA-1 hashes.
fn split_pieces_hashes(pieces: &[u8]) -> Result<Vec<[u8; 20]>> {
    if pieces.len() % SHA1_HASH_SIZE != 0 {
        return Err(Error::Metainfo(format!(
            "pieces field of {} bytes is not a multiple of {}",
            pieces.len(),
            SHA1_HASH_SIZE
        )));
    }

    let hashes = pieces
        .chunks_exact(SHA1_HASH_SIZE)
        .map(|chunk| {
            let mut hash = [0; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    Ok(hashes)
}
