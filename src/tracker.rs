//! # Tracker Announce
//!
//! Peers are discovered by announcing to the torrent's HTTP trackers. Each
//! tracker answers with a bencoded dictionary whose `peers` key holds a
//! compact peer list (see [`crate::peer`]).
//!
//! Every distinct tracker URL is queried in parallel. Trackers that fail are
//! skipped, peers from the others are merged and de-duplicated.

use crate::error::{Error, Result};
use crate::handshake::{InfoHash, PeerId};
use crate::peer::*;
use crate::torrent::Torrent;

use crossbeam_channel::unbounded;
use serde::Deserialize;
use serde_bencode::de;
use serde_bytes::ByteBuf;
use url::Url;

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

// Bound on a single tracker request
const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

/// BencodeTracker structure.
#[derive(Debug, Deserialize)]
struct BencodeTracker {
    // Human readable reason the announce was refused
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    // Interval time to refresh the list of peers in seconds
    #[serde(default)]
    interval: Option<u32>,
    // Peers IP addresses, compact form
    #[serde(default)]
    peers: Option<ByteBuf>,
}

/// Builds the announce URL for `announce`.
///
/// Binary fields are percent-encoded byte by byte.
pub fn build_tracker_url(
    announce: &str,
    info_hash: &InfoHash,
    peer_id: &PeerId,
    port: u16,
    left: u64,
) -> Result<String> {
    /// Each byte is encoded as %XX where XX is the hexadecimal representation
    fn percent_encode_binary(data: &[u8]) -> String {
        const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";
        let mut encoded = String::with_capacity(data.len() * 3);

        for &byte in data {
            encoded.push('%');
            encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            encoded.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
        }

        encoded
    }

    let base_url = Url::parse(announce)
        .map_err(|e| Error::Tracker(format!("could not parse tracker url {}: {}", announce, e)))?;

    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&event=started",
        percent_encode_binary(info_hash),
        percent_encode_binary(peer_id),
        port,
        left
    );

    let mut url = base_url.to_string();
    url.push(if base_url.query().is_some() { '&' } else { '?' });
    url.push_str(&query);

    Ok(url)
}

/// Decodes a tracker response body into peers.
pub fn parse_tracker_response(body: &[u8]) -> Result<Vec<Peer>> {
    let response = de::from_bytes::<BencodeTracker>(body)
        .map_err(|e| Error::Tracker(format!("could not decode tracker response: {}", e)))?;

    if let Some(reason) = response.failure_reason {
        return Err(Error::Tracker(format!("tracker refused announce: {}", reason)));
    }
    if let Some(interval) = response.interval {
        debug!("Tracker asks for a re-announce every {}s", interval);
    }

    match response.peers {
        Some(peers) => parse_compact_peers(&peers),
        None => Err(Error::Tracker("tracker response has no peers".into())),
    }
}

fn announce_one(url: &str) -> Result<Vec<Peer>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(TRACKER_TIMEOUT)
        .build()
        .map_err(|e| Error::Tracker(format!("could not build http client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map_err(|e| Error::Tracker(format!("announce failed: {}", e)))?;

    parse_tracker_response(&response)
}

/// Requests peers from every tracker of `torrent`.
///
/// # Errors
///
/// Returns [`Error::Tracker`] if no tracker returned any peer.
pub fn request_peers(torrent: &Torrent, port: u16) -> Result<Vec<Peer>> {
    let tracker_urls = torrent.tracker_urls();
    if tracker_urls.is_empty() {
        return Err(Error::Tracker("no tracker URLs available".into()));
    }

    let (peers_tx, peers_rx) = unbounded();
    let mut handles = Vec::new();

    for tracker_url in tracker_urls {
        let full_url = match build_tracker_url(
            &tracker_url,
            &torrent.info_hash(),
            &torrent.peer_id(),
            port,
            torrent.length(),
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        let peers_tx = peers_tx.clone();
        handles.push(thread::spawn(move || match announce_one(&full_url) {
            Ok(peers) => {
                info!("Tracker {} returned {} peers", tracker_url, peers.len());
                let _ = peers_tx.send(peers);
            }
            Err(e) => warn!("Tracker {}: {}", tracker_url, e),
        }));
    }
    drop(peers_tx);

    for handle in handles {
        let _ = handle.join();
    }

    // Deduplicate peers by (ip, port), first seen wins
    let mut unique_peers = HashSet::new();
    let peers: Vec<Peer> = peers_rx
        .iter()
        .flatten()
        .filter(|peer| unique_peers.insert(*peer))
        .collect();

    if peers.is_empty() {
        return Err(Error::Tracker("could not get peers from any tracker".into()));
    }

    Ok(peers)
}
