//! # Download Coordination
//!
//! Turns a [`Torrent`] and a list of peers into the complete file:
//!
//! 1. **Queue work**: one [`PieceWork`] per piece on the shared work queue
//! 2. **Start workers**: one thread per peer, all connecting in parallel
//! 3. **Collect results**: copy each verified piece to its offset in the
//!    output buffer and report progress
//! 4. **Shut down**: close the queue so idle workers exit
//!
//! Pieces complete in any order. Each one covers a disjoint byte range of
//! the output, so the assembled file does not depend on that order.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::piece::*;
use crate::queue::WorkQueue;
use crate::torrent::Torrent;
use crate::worker::*;

use crossbeam_channel::{unbounded, Sender};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot reported after every completed piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Piece that just completed
    pub index: u32,
    /// Pieces completed so far
    pub completed: usize,
    /// Pieces in the torrent
    pub total: usize,
    /// Workers holding a live connection
    pub active_peers: usize,
}

impl ProgressSample {
    /// Completed share of the download, between 0 and 1.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// Receives progress samples. Implementations must not block.
pub trait ProgressObserver {
    fn on_progress(&self, sample: &ProgressSample);
}

impl ProgressObserver for () {
    fn on_progress(&self, _sample: &ProgressSample) {}
}

impl ProgressObserver for Sender<ProgressSample> {
    fn on_progress(&self, sample: &ProgressSample) {
        // A consumer that went away or fell behind must not stall the download.
        let _ = self.try_send(*sample);
    }
}

/// Downloads every piece of `torrent` from `peers` and assembles the file.
///
/// # Errors
///
/// - [`Error::Stalled`] if a piece failed verification `config.max_attempts` times
/// - [`Error::NoPeers`] if every worker exited before the file was complete
pub fn download(
    torrent: &Torrent,
    peers: &[Peer],
    config: &DownloadConfig,
    observer: &dyn ProgressObserver,
) -> Result<Vec<u8>> {
    let nb_pieces = torrent.piece_count();
    let mut data: Vec<u8> = vec![0; torrent.length() as usize];

    info!(
        "Downloading {:?} ({} pieces) from {} peers",
        torrent.name(),
        nb_pieces,
        peers.len()
    );

    if nb_pieces == 0 {
        return Ok(data);
    }

    let pieces = torrent
        .pieces_hashes()
        .iter()
        .enumerate()
        .map(|(index, hash)| {
            let index = index as u32;
            PieceWork::new(index, *hash, torrent.piece_len(index))
        });
    let (queue, closer) = WorkQueue::new(pieces);
    let (result_tx, result_rx) = unbounded();

    let config = Arc::new(config.clone());
    let active = Arc::new(AtomicUsize::new(0));
    let gate = config.max_connecting.map(ConnectGate::new);

    for peer in peers {
        Worker::new(
            *peer,
            torrent.peer_id(),
            torrent.info_hash(),
            Arc::clone(&config),
            queue.clone(),
            result_tx.clone(),
            Arc::clone(&active),
            gate.clone(),
        )
        .spawn();
    }

    // Only workers hold senders now, so recv fails once they have all exited.
    drop(result_tx);
    drop(queue);

    let mut written = vec![false; nb_pieces];
    let mut nb_pieces_downloaded = 0;
    while nb_pieces_downloaded < nb_pieces {
        let piece_result = match result_rx.recv() {
            Ok(PieceOutcome::Done(piece_result)) => piece_result,
            Ok(PieceOutcome::Stalled(index)) => {
                closer.close();
                return Err(Error::Stalled(index));
            }
            Err(_) => {
                closer.close();
                return Err(Error::NoPeers);
            }
        };

        let index = piece_result.index as usize;
        if written[index] {
            warn!("Piece {} delivered twice, keeping the first copy", index);
            continue;
        }

        let (begin, _) = torrent.piece_bounds(piece_result.index);
        data[begin..begin + piece_result.data.len()].copy_from_slice(&piece_result.data);
        written[index] = true;
        nb_pieces_downloaded += 1;

        let sample = ProgressSample {
            index: piece_result.index,
            completed: nb_pieces_downloaded,
            total: nb_pieces,
            active_peers: active.load(Ordering::SeqCst),
        };
        info!(
            "({:.2}%) Downloaded piece #{} from {} peers",
            sample.fraction() * 100.0,
            sample.index,
            sample.active_peers
        );
        observer.on_progress(&sample);
    }

    closer.close();

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn fraction_of_completed_pieces() {
        let sample = ProgressSample {
            index: 0,
            completed: 1,
            total: 4,
            active_peers: 2,
        };
        assert_eq!(sample.fraction(), 0.25);
    }

    #[test]
    fn channel_observer_never_blocks() {
        let (tx, rx) = bounded(1);
        let sample = ProgressSample {
            index: 0,
            completed: 1,
            total: 2,
            active_peers: 1,
        };
        tx.on_progress(&sample);
        tx.on_progress(&sample);
        assert_eq!(rx.len(), 1);

        drop(rx);
        tx.on_progress(&sample);
    }

    #[test]
    fn empty_torrent_needs_no_peers() {
        let torrent = Torrent::new("empty", "http://t", [0; 20], 16384, vec![], 0).unwrap();
        let data = download(&torrent, &[], &DownloadConfig::default(), &()).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn no_reachable_peer_is_reported() {
        let torrent = Torrent::new("f", "http://t", [0; 20], 16384, vec![[0; 20]], 10).unwrap();
        let err = download(&torrent, &[], &DownloadConfig::default(), &()).unwrap_err();
        assert!(matches!(err, Error::NoPeers));
    }
}
