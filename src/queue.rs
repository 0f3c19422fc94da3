//! # Piece Work Queue
//!
//! Multi-producer multi-consumer queue of [`PieceWork`] shared by all
//! workers. Workers both take pieces from it and put failed pieces back, so
//! the channel itself never disconnects. Shutdown is signalled separately:
//! the orchestrator holds a [`QueueCloser`] and every blocked [`WorkQueue::pop`]
//! returns `None` once it is closed or dropped.

use crate::piece::PieceWork;

use crossbeam_channel::{select, unbounded, Receiver, Sender, TryRecvError};

/// Worker-side handle to the shared queue.
#[derive(Clone)]
pub struct WorkQueue {
    work_tx: Sender<PieceWork>,
    work_rx: Receiver<PieceWork>,
    done_rx: Receiver<()>,
}

/// Orchestrator-side handle that shuts the queue down.
pub struct QueueCloser {
    _done_tx: Sender<()>,
}

impl QueueCloser {
    /// Wakes every blocked worker and makes further pops return `None`.
    pub fn close(self) {}
}

impl WorkQueue {
    /// Creates a queue pre-loaded with `pieces`.
    pub fn new(pieces: impl IntoIterator<Item = PieceWork>) -> (WorkQueue, QueueCloser) {
        let (work_tx, work_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();

        for piece in pieces {
            // Cannot fail, the receiver is alive.
            let _ = work_tx.send(piece);
        }

        let queue = WorkQueue {
            work_tx,
            work_rx,
            done_rx,
        };
        (queue, QueueCloser { _done_tx: done_tx })
    }

    /// Returns a piece to the queue for another attempt.
    pub fn push(&self, piece: PieceWork) {
        let _ = self.work_tx.send(piece);
    }

    /// Blocks until a piece is available or the queue is closed.
    pub fn pop(&self) -> Option<PieceWork> {
        if self.is_closed() {
            return None;
        }
        select! {
            recv(self.done_rx) -> _ => None,
            recv(self.work_rx) -> piece => piece.ok(),
        }
    }

    /// Number of pieces currently waiting.
    pub fn len(&self) -> usize {
        self.work_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.work_rx.is_empty()
    }

    /// True once the [`QueueCloser`] has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        // Nothing is ever sent on the done channel, it only disconnects.
        matches!(self.done_rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}
