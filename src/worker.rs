//! # BitTorrent Worker Thread
//!
//! A worker owns the whole conversation with a single peer. The downloader
//! starts one worker per peer, each on its own thread.
//!
//! ## Worker Lifecycle
//!
//! ```text
//! Connecting -> Ready -> (Fetching <-> Idle) -> Closed
//! ```
//!
//! 1. **Connecting**: TCP connect, handshake and bitfield. A failure here
//!    ends the worker before it has taken any piece.
//! 2. **Ready**: UNCHOKE and INTERESTED are sent to the peer.
//! 3. **Idle**: Pull the next piece from the shared work queue. Pieces the
//!    peer does not have go straight back to the queue.
//! 4. **Fetching**: Download the piece with pipelined block requests, then
//!    verify its SHA-1 digest.
//! 5. **Closed**: The queue was closed, or the connection broke.
//!
//! ## Failure Policy
//!
//! - Transport and format errors put the piece back and end the worker, the
//!   connection is presumed unusable. They do not count against the piece.
//! - An integrity failure puts the piece back and keeps the connection.
//! - A piece that keeps failing verification is eventually reported as
//!   stalled instead of being retried forever.

use crate::client::*;
use crate::config::DownloadConfig;
use crate::error::Result;
use crate::handshake::{InfoHash, PeerId};
use crate::message::*;
use crate::peer::*;
use crate::piece::*;
use crate::queue::WorkQueue;

use crossbeam_channel::{bounded, Receiver, Sender};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Per-attempt state of one piece being downloaded from one peer.
struct DownloadState<'a> {
    /// Index of the piece being downloaded
    index: u32,
    /// Connection the piece is downloaded from
    client: &'a mut Client,
    /// Destination buffer, one piece long
    buf: Vec<u8>,
    /// Bytes received so far
    downloaded: u32,
    /// Bytes requested so far
    requested: u32,
    /// Requests sent but not yet answered
    backlog: u32,
}

impl<'a> DownloadState<'a> {
    fn new(client: &'a mut Client, index: u32, length: u32) -> Self {
        DownloadState {
            index,
            client,
            buf: vec![0; length as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    fn length(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Keeps up to `max_backlog` block requests in flight.
    fn fill_backlog(&mut self, config: &DownloadConfig) -> Result<()> {
        while self.backlog < config.max_backlog && self.requested < self.length() {
            let block_size = config.block_size.min(self.length() - self.requested);

            self.client
                .send_request(self.index, self.requested, block_size)?;

            self.backlog += 1;
            self.requested += block_size;
        }
        Ok(())
    }

    /// Reads one message and applies it to the connection and this piece.
    fn read_message(&mut self) -> Result<()> {
        match self.client.read_message()? {
            Message::Unchoke => self.client.read_unchoke(),
            Message::Choke => {
                self.client.read_choke();
                debug!("Peer {} choked us, waiting for unchoke", self.client.peer());
            }
            message @ Message::Have(_) => self.client.read_have(&message)?,
            message @ Message::Piece { .. } => {
                let n = parse_piece(self.index, &mut self.buf, &message)?;
                self.downloaded += n as u32;
                self.backlog = self.backlog.saturating_sub(1);
            }
            _ => {}
        }
        Ok(())
    }

    fn download(mut self, config: &DownloadConfig) -> Result<Vec<u8>> {
        while self.downloaded < self.length() {
            if !self.client.is_choked() {
                self.fill_backlog(config)?;
            }
            self.read_message()?;
        }
        Ok(self.buf)
    }
}

/// Downloads one piece from `client` under the per-piece deadline.
///
/// The returned bytes are not verified yet.
pub fn attempt_download(
    client: &mut Client,
    work: &PieceWork,
    config: &DownloadConfig,
) -> Result<Vec<u8>> {
    client.set_deadline(config.piece_timeout)?;
    let result = DownloadState::new(client, work.index, work.length).download(config);
    let cleared = client.clear_deadline();

    let buf = result?;
    cleared?;

    Ok(buf)
}

/// Bounded gate limiting how many workers may be connecting at once.
#[derive(Clone)]
pub struct ConnectGate {
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
}

/// A held gate slot, released on drop.
pub struct GateSlot<'a> {
    gate: &'a ConnectGate,
}

impl ConnectGate {
    pub fn new(max_connecting: usize) -> ConnectGate {
        let (slots_tx, slots_rx) = bounded(max_connecting.max(1));
        ConnectGate { slots_tx, slots_rx }
    }

    /// Blocks until a slot is free.
    pub fn acquire(&self) -> GateSlot<'_> {
        // Both ends live in self, send cannot disconnect.
        let _ = self.slots_tx.send(());
        GateSlot { gate: self }
    }
}

impl Drop for GateSlot<'_> {
    fn drop(&mut self) {
        let _ = self.gate.slots_rx.try_recv();
    }
}

/// Counts workers that hold a live connection.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> ActiveGuard {
        active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Manages downloading from a single BitTorrent peer.
pub struct Worker {
    /// Address of the remote peer
    peer: Peer,
    /// 20-byte unique identifier for this client instance
    peer_id: PeerId,
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    info_hash: InfoHash,
    /// Timeouts and pipelining parameters
    config: Arc<DownloadConfig>,
    /// Shared queue of pieces still to download
    queue: WorkQueue,
    /// Channel for publishing finished or stalled pieces
    results: Sender<PieceOutcome>,
    /// Number of workers currently connected
    active: Arc<AtomicUsize>,
    /// Optional limit on simultaneous connection attempts
    gate: Option<ConnectGate>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        peer: Peer,
        peer_id: PeerId,
        info_hash: InfoHash,
        config: Arc<DownloadConfig>,
        queue: WorkQueue,
        results: Sender<PieceOutcome>,
        active: Arc<AtomicUsize>,
        gate: Option<ConnectGate>,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            config,
            queue,
            results,
            active,
            gate,
        }
    }

    /// Spawns the worker on its own thread.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.start_download())
    }

    fn connect(&self) -> Result<Client> {
        let _slot = self.gate.as_ref().map(ConnectGate::acquire);
        Client::connect(self.peer, self.info_hash, self.peer_id, &self.config)
    }

    /// Runs the worker until the queue closes or the connection fails.
    pub fn start_download(self) {
        let mut client = match self.connect() {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not connect to peer {}: {}", self.peer, e);
                return;
            }
        };

        info!("Connected to peer {}", self.peer);
        let _active = ActiveGuard::new(Arc::clone(&self.active));

        if let Err(e) = client.send_unchoke().and_then(|_| client.send_interested()) {
            warn!("Could not start session with peer {}: {}", self.peer, e);
            return;
        }

        // Consecutive pieces this peer could not serve.
        let mut misses = 0;

        while let Some(work) = self.queue.pop() {
            if !client.has_piece(work.index) {
                self.queue.push(work);
                misses += 1;
                if misses >= self.queue.len().max(1) {
                    thread::sleep(self.config.idle_backoff);
                    misses = 0;
                }
                continue;
            }
            misses = 0;

            let buf = match attempt_download(&mut client, &work, &self.config) {
                Ok(buf) => buf,
                Err(e) => {
                    warn!(
                        "Could not download piece {} from peer {}: {}",
                        work.index, self.peer, e
                    );
                    // The connection failed, not the piece.
                    self.queue.push(work);
                    return;
                }
            };

            if let Err(e) = verify_integrity(work.index, &buf, &work.hash) {
                warn!("{} (from peer {})", e, self.peer);
                if !self.give_back(work) {
                    return;
                }
                continue;
            }

            // Best effort: the peer learning we have the piece is not required.
            if let Err(e) = client.send_have(work.index) {
                warn!("Could not notify peer {} of piece {}: {}", self.peer, work.index, e);
            }

            info!("Downloaded piece {} from peer {}", work.index, self.peer);

            let result = PieceResult::new(work.index, buf);
            if self.results.send(PieceOutcome::Done(result)).is_err() {
                return;
            }
        }

        debug!("Worker for peer {} exiting: work queue closed", self.peer);
    }

    /// Requeues a piece that failed verification, or reports it stalled once
    /// it has used up its attempts. Returns false if nobody is collecting results anymore.
    fn give_back(&self, mut work: PieceWork) -> bool {
        if work.record_failure(self.config.max_attempts) {
            error!(
                "Piece {} failed {} times, giving up on it",
                work.index, work.attempts
            );
            return self.results.send(PieceOutcome::Stalled(work.index)).is_ok();
        }
        self.queue.push(work);
        true
    }
}
