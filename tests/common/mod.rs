//! Mock BitTorrent peers for integration tests.
//!
//! Each mock listens on 127.0.0.1, answers the handshake, advertises the
//! pieces it holds and serves REQUESTs until the client hangs up.

#![allow(dead_code)]

use leech::handshake::{read_handshake, Handshake, InfoHash};
use leech::message::read_message;
use leech::{Bitfield, Message, Peer, Torrent};

use sha1::{Digest, Sha1};

use std::collections::HashMap;
use std::io::Write;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How a mock peer reacts once the handshake is done.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Behavior {
    /// Unchoke on INTERESTED and serve every request
    Serve,
    /// Serve, but corrupt the first copy of the given piece
    CorruptFirst(u32),
    /// Serve, but corrupt every copy of the given piece
    CorruptAlways(u32),
    /// Answer INTERESTED with CHOKE and hang up
    ChokeThenClose,
    /// Reply to the handshake with a different info hash
    WrongInfoHash,
}

/// What a mock peer observed, for assertions.
#[derive(Default, Debug)]
pub struct PeerLog {
    /// (index, begin, length) of every REQUEST
    pub requests: Vec<(u32, u32, u32)>,
    /// Indices of every HAVE
    pub haves: Vec<u32>,
}

pub struct MockPeer {
    pub peer: Peer,
    pub log: Arc<Mutex<PeerLog>>,
}

impl MockPeer {
    /// HAVE indices received so far, sorted. Messages the client sent just
    /// before the download returned may still be in flight, so this waits
    /// up to two seconds for `expected` of them.
    pub fn haves(&self, expected: usize) -> Vec<u32> {
        let started = Instant::now();
        loop {
            let mut haves = self.log.lock().unwrap().haves.clone();
            if haves.len() >= expected || started.elapsed() > Duration::from_secs(2) {
                haves.sort_unstable();
                return haves;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// Deterministic file contents.
pub fn content(length: usize) -> Vec<u8> {
    (0..length).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Builds a torrent describing `data`.
pub fn torrent_for(data: &[u8], piece_length: u32) -> Torrent {
    let hashes = data
        .chunks(piece_length as usize)
        .map(|chunk| {
            let mut hash = [0; 20];
            hash.copy_from_slice(&Sha1::digest(chunk));
            hash
        })
        .collect();
    Torrent::new(
        "test.bin",
        "http://127.0.0.1/announce",
        [0x42; 20],
        piece_length,
        hashes,
        data.len() as u64,
    )
    .unwrap()
}

/// Starts a mock peer holding `pieces` of `data`.
pub fn spawn_peer(
    torrent: &Torrent,
    data: &[u8],
    pieces: &[u32],
    behavior: Behavior,
) -> MockPeer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer = Peer::new(Ipv4Addr::LOCALHOST, listener.local_addr().unwrap().port());

    let mut bitfield = Bitfield::with_capacity(torrent.piece_count());
    let mut served = HashMap::new();
    for &index in pieces {
        bitfield.set_piece(index);
        let (begin, end) = torrent.piece_bounds(index);
        served.insert(index, data[begin..end].to_vec());
    }

    let state = Arc::new(MockState {
        info_hash: torrent.info_hash(),
        bitfield,
        pieces: served,
        behavior,
        corrupted: Mutex::new(Vec::new()),
    });
    let log = Arc::new(Mutex::new(PeerLog::default()));

    let handler_log = Arc::clone(&log);
    thread::spawn(move || {
        for conn in listener.incoming() {
            let Ok(conn) = conn else { return };
            let state = Arc::clone(&state);
            let log = Arc::clone(&handler_log);
            thread::spawn(move || {
                let _ = state.handle(conn, &log);
            });
        }
    });

    MockPeer { peer, log }
}

struct MockState {
    info_hash: InfoHash,
    bitfield: Bitfield,
    pieces: HashMap<u32, Vec<u8>>,
    behavior: Behavior,
    corrupted: Mutex<Vec<u32>>,
}

impl MockState {
    fn handle(&self, mut conn: TcpStream, log: &Mutex<PeerLog>) -> leech::Result<()> {
        read_handshake(&mut conn)?;

        let info_hash = if self.behavior == Behavior::WrongInfoHash {
            [0xee; 20]
        } else {
            self.info_hash
        };
        conn.write_all(&Handshake::new(info_hash, *b"-MO0001-mockpeer0000").serialize())?;
        conn.write_all(&Message::Bitfield(self.bitfield.clone()).serialize())?;

        loop {
            match read_message(&mut conn)? {
                Message::Interested => {
                    if self.behavior == Behavior::ChokeThenClose {
                        conn.write_all(&Message::Choke.serialize())?;
                        return Ok(());
                    }
                    conn.write_all(&Message::Unchoke.serialize())?;
                }
                Message::Request {
                    index,
                    begin,
                    length,
                } => {
                    log.lock().unwrap().requests.push((index, begin, length));
                    let Some(piece) = self.pieces.get(&index) else {
                        continue;
                    };
                    let begin_at = begin as usize;
                    let mut block = piece[begin_at..begin_at + length as usize].to_vec();
                    if self.corrupts(index, begin) {
                        block[0] ^= 0x01;
                    }
                    conn.write_all(
                        &Message::Piece {
                            index,
                            begin,
                            block,
                        }
                        .serialize(),
                    )?;
                }
                Message::Have(index) => log.lock().unwrap().haves.push(index),
                _ => {}
            }
        }
    }

    fn corrupts(&self, index: u32, begin: u32) -> bool {
        match self.behavior {
            Behavior::CorruptAlways(target) => target == index && begin == 0,
            Behavior::CorruptFirst(target) if target == index && begin == 0 => {
                let mut corrupted = self.corrupted.lock().unwrap();
                if corrupted.contains(&index) {
                    false
                } else {
                    corrupted.push(index);
                    true
                }
            }
            _ => false,
        }
    }
}
