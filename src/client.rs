//! # BitTorrent Peer Client
//!
//! One [`Client`] owns one TCP connection to one remote peer together with
//! the state the peer wire protocol attaches to it.
//!
//! ## Connection Setup
//!
//! 1. **Connect**: TCP connect bounded by the connect timeout
//! 2. **Handshake**: Send ours, read theirs, compare info hashes
//! 3. **Bitfield**: The very next message must be the peer's BITFIELD
//!
//! Only when all three succeed does the caller get a `Client`. It starts
//! out choked: no block may be requested until the peer sends UNCHOKE.
//!
//! ## Deadlines
//!
//! Every bounded operation installs socket timeouts for its own duration
//! and clears them when it returns, so a deadline never leaks into an
//! unrelated read or write. A multi-message operation such as downloading a
//! piece uses [`Client::set_deadline`], which shrinks the read timeout as the
//! deadline approaches.

use crate::bitfield::Bitfield;
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::handshake::*;
use crate::message::*;
use crate::peer::Peer;

use std::io::{ErrorKind, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// A live, handshaken connection to a remote peer.
pub struct Client {
    /// Address of the remote peer
    peer: Peer,
    /// TCP stream connection to the peer
    conn: TcpStream,
    /// Pieces the peer has announced, via BITFIELD and later HAVE messages
    bitfield: Bitfield,
    /// Whether the peer currently refuses our requests
    choked: bool,
    /// Absolute deadline for the current multi-message operation
    deadline: Option<Instant>,
}

impl Client {
    /// Connects to `peer`, performs the handshake and reads its bitfield.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] / [`Error::Timeout`] if the peer is unreachable or too slow
    /// - [`Error::Protocol`] if the handshake closes early, the info hash
    ///   differs, or the first message is not a BITFIELD
    pub fn connect(
        peer: Peer,
        info_hash: InfoHash,
        peer_id: PeerId,
        config: &DownloadConfig,
    ) -> Result<Client> {
        let conn = TcpStream::connect_timeout(&peer.socket_addr(), config.connect_timeout)
            .map_err(|e| Error::from_io(e, "connecting"))?;

        debug!("Connected to peer {}", peer);

        let mut client = Client {
            peer,
            conn,
            bitfield: Bitfield::default(),
            choked: true,
            deadline: None,
        };

        client.handshake(info_hash, peer_id, config.handshake_timeout)?;
        client.bitfield = client.read_bitfield(config.bitfield_timeout)?;

        Ok(client)
    }

    /// Address of the remote peer.
    pub fn peer(&self) -> Peer {
        self.peer
    }

    /// Returns whether the peer is choking us.
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    /// Checks if the peer has announced piece `index`.
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has_piece(index)
    }

    fn set_timeouts(&self, timeout: Option<Duration>) -> Result<()> {
        self.conn.set_read_timeout(timeout)?;
        self.conn.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Installs an overall deadline for the following reads and writes.
    pub fn set_deadline(&mut self, timeout: Duration) -> Result<()> {
        self.deadline = Some(Instant::now() + timeout);
        self.set_timeouts(Some(timeout))
    }

    /// Removes the deadline installed by [`Client::set_deadline`].
    pub fn clear_deadline(&mut self) -> Result<()> {
        self.deadline = None;
        self.set_timeouts(None)
    }

    /// Shrinks socket timeouts to the time left before the deadline.
    fn apply_deadline(&self, during: &'static str) -> Result<()> {
        if let Some(deadline) = self.deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(during));
            }
            self.set_timeouts(Some(remaining))?;
        }
        Ok(())
    }

    fn handshake(&mut self, info_hash: InfoHash, peer_id: PeerId, timeout: Duration) -> Result<()> {
        self.set_timeouts(Some(timeout))?;
        let result = self.exchange_handshake(info_hash, peer_id);
        self.set_timeouts(None)?;
        result
    }

    fn exchange_handshake(&mut self, info_hash: InfoHash, peer_id: PeerId) -> Result<()> {
        let handshake = Handshake::new(info_hash, peer_id);
        self.conn
            .write_all(&handshake.serialize())
            .map_err(|e| Error::from_io(e, "sending handshake"))?;

        let reply = match read_handshake(&mut self.conn) {
            Ok(reply) => reply,
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Error::Protocol("handshake closed".into()));
            }
            Err(Error::Io(e)) => return Err(Error::from_io(e, "reading handshake")),
            Err(e) => return Err(e),
        };

        if reply.info_hash != info_hash {
            return Err(Error::Protocol("info hash mismatch".into()));
        }
        debug!(
            "Peer {} answered with protocol {:?}",
            self.peer,
            String::from_utf8_lossy(reply.pstr())
        );

        debug!("Handshake complete with peer {}", self.peer);

        Ok(())
    }

    fn read_bitfield(&mut self, timeout: Duration) -> Result<Bitfield> {
        self.set_timeouts(Some(timeout))?;
        let result = read_message(&mut self.conn);
        self.set_timeouts(None)?;

        match result {
            Ok(Message::Bitfield(bitfield)) => {
                debug!("Receive MESSAGE_BITFIELD from peer {}", self.peer);
                Ok(bitfield)
            }
            Ok(other) => Err(Error::Protocol(format!(
                "expected bitfield, got {:?}",
                other.id()
            ))),
            Err(Error::Format(e)) => Err(Error::Protocol(format!("expected bitfield: {}", e))),
            Err(Error::Io(e)) => Err(Error::from_io(e, "reading bitfield")),
            Err(e) => Err(e),
        }
    }

    /// Reads the next message from the peer, honouring the current deadline.
    pub fn read_message(&mut self) -> Result<Message> {
        self.apply_deadline("reading message")?;
        let message = read_message(&mut self.conn).map_err(|e| match e {
            Error::Io(e) => Error::from_io(e, "reading message"),
            e => e,
        })?;

        match message.id() {
            Some(id) => debug!("Receive message {} from peer {}", id, self.peer),
            None => debug!("Receive KEEP_ALIVE from peer {}", self.peer),
        }

        Ok(message)
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        self.apply_deadline("sending message")?;
        self.conn
            .write_all(&message.serialize())
            .map_err(|e| Error::from_io(e, "sending message"))
    }

    /// Records a CHOKE from the peer.
    pub fn read_choke(&mut self) {
        debug!("Receive MESSAGE_CHOKE from peer {}", self.peer);
        self.choked = true
    }

    /// Records an UNCHOKE from the peer.
    pub fn read_unchoke(&mut self) {
        debug!("Receive MESSAGE_UNCHOKE from peer {}", self.peer);
        self.choked = false
    }

    /// Records a HAVE from the peer in its bitfield.
    pub fn read_have(&mut self, message: &Message) -> Result<()> {
        let index = parse_have(message)?;
        debug!("Receive MESSAGE_HAVE {} from peer {}", index, self.peer);
        self.bitfield.set_piece(index);
        Ok(())
    }

    /// Sends an UNCHOKE message to the peer.
    pub fn send_unchoke(&mut self) -> Result<()> {
        debug!("Send MESSAGE_UNCHOKE to peer {}", self.peer);
        self.send(&Message::Unchoke)
    }

    /// Sends an INTERESTED message to the peer.
    pub fn send_interested(&mut self) -> Result<()> {
        debug!("Send MESSAGE_INTERESTED to peer {}", self.peer);
        self.send(&Message::Interested)
    }

    /// Requests `length` bytes of piece `index` starting at `begin`.
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        debug!(
            "Send MESSAGE_REQUEST for piece {} [{}:{}] to peer {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        self.send(&Message::Request { index, begin, length })
    }

    /// Tells the peer we now hold piece `index`.
    pub fn send_have(&mut self, index: u32) -> Result<()> {
        debug!("Send MESSAGE_HAVE {} to peer {}", index, self.peer);
        self.send(&Message::Have(index))
    }
}
