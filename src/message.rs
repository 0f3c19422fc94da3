//! # BitTorrent Peer Wire Messages
//!
//! Every message after the handshake is framed the same way:
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length Prefix**: 4 bytes (big-endian u32) - Length of message ID + payload
//! - **Message ID**: 1 byte - Identifies the message type
//! - **Payload**: Variable length - Message-specific data
//!
//! A length prefix of zero is a keep-alive and carries neither ID nor payload.
//!
//! ## Message Types
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | CHOKE | none |
//! | 1 | UNCHOKE | none |
//! | 2 | INTERESTED | none |
//! | 3 | NOT INTERESTED | none |
//! | 4 | HAVE | piece index |
//! | 5 | BITFIELD | bitfield bytes |
//! | 6 | REQUEST | index, begin, length |
//! | 7 | PIECE | index, begin, block |
//! | 8 | CANCEL | index, begin, length |
//! | 9 | PORT | DHT listen port |

use crate::bitfield::Bitfield;
use crate::error::{Error, Result};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::Read;

pub type MessageId = u8;

pub const MESSAGE_CHOKE: MessageId = 0;
pub const MESSAGE_UNCHOKE: MessageId = 1;
pub const MESSAGE_INTERESTED: MessageId = 2;
pub const MESSAGE_NOT_INTERESTED: MessageId = 3;
pub const MESSAGE_HAVE: MessageId = 4;
pub const MESSAGE_BITFIELD: MessageId = 5;
pub const MESSAGE_REQUEST: MessageId = 6;
pub const MESSAGE_PIECE: MessageId = 7;
pub const MESSAGE_CANCEL: MessageId = 8;
pub const MESSAGE_PORT: MessageId = 9;

// Refuse frames larger than this rather than allocate whatever a peer claims.
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// A peer wire protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Bitfield),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Port(u16),
    /// A message ID outside the base protocol, kept so callers can skip it.
    Unknown { id: MessageId, payload: Vec<u8> },
}

impl Message {
    /// Wire ID of this message, `None` for keep-alive.
    pub fn id(&self) -> Option<MessageId> {
        let id = match self {
            Message::KeepAlive => return None,
            Message::Choke => MESSAGE_CHOKE,
            Message::Unchoke => MESSAGE_UNCHOKE,
            Message::Interested => MESSAGE_INTERESTED,
            Message::NotInterested => MESSAGE_NOT_INTERESTED,
            Message::Have(_) => MESSAGE_HAVE,
            Message::Bitfield(_) => MESSAGE_BITFIELD,
            Message::Request { .. } => MESSAGE_REQUEST,
            Message::Piece { .. } => MESSAGE_PIECE,
            Message::Cancel { .. } => MESSAGE_CANCEL,
            Message::Port(_) => MESSAGE_PORT,
            Message::Unknown { id, .. } => *id,
        };
        Some(id)
    }

    /// Encodes the message payload (everything after the ID byte).
    fn payload(&self) -> Vec<u8> {
        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => vec![],
            Message::Have(index) => {
                let mut payload = vec![0; 4];
                BigEndian::write_u32(&mut payload, *index);
                payload
            }
            Message::Bitfield(bitfield) => bitfield.as_bytes().to_vec(),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                let mut payload = vec![0; 12];
                BigEndian::write_u32(&mut payload[0..4], *index);
                BigEndian::write_u32(&mut payload[4..8], *begin);
                BigEndian::write_u32(&mut payload[8..12], *length);
                payload
            }
            Message::Piece { index, begin, block } => {
                let mut payload = vec![0; 8 + block.len()];
                BigEndian::write_u32(&mut payload[0..4], *index);
                BigEndian::write_u32(&mut payload[4..8], *begin);
                payload[8..].copy_from_slice(block);
                payload
            }
            Message::Port(port) => {
                let mut payload = vec![0; 2];
                BigEndian::write_u16(&mut payload, *port);
                payload
            }
            Message::Unknown { payload, .. } => payload.clone(),
        }
    }

    /// Serializes the message with its length prefix.
    pub fn serialize(&self) -> Vec<u8> {
        let id = match self.id() {
            Some(id) => id,
            None => return vec![0; 4],
        };
        let payload = self.payload();

        let mut serialized = vec![0; 5];
        BigEndian::write_u32(&mut serialized[0..4], 1 + payload.len() as u32);
        serialized[4] = id;
        serialized.extend_from_slice(&payload);
        serialized
    }

    /// Decodes a message from its ID and raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if a fixed-size payload has the wrong length
    /// or a PIECE payload is shorter than its 8-byte header.
    pub fn decode(id: MessageId, payload: &[u8]) -> Result<Message> {
        let message = match id {
            MESSAGE_CHOKE => Message::Choke,
            MESSAGE_UNCHOKE => Message::Unchoke,
            MESSAGE_INTERESTED => Message::Interested,
            MESSAGE_NOT_INTERESTED => Message::NotInterested,
            MESSAGE_HAVE => {
                expect_len("HAVE", payload, 4)?;
                Message::Have(BigEndian::read_u32(payload))
            }
            MESSAGE_BITFIELD => Message::Bitfield(Bitfield::from_bytes(payload.to_vec())),
            MESSAGE_REQUEST | MESSAGE_CANCEL => {
                let name = if id == MESSAGE_REQUEST { "REQUEST" } else { "CANCEL" };
                expect_len(name, payload, 12)?;
                let index = BigEndian::read_u32(&payload[0..4]);
                let begin = BigEndian::read_u32(&payload[4..8]);
                let length = BigEndian::read_u32(&payload[8..12]);
                if id == MESSAGE_REQUEST {
                    Message::Request { index, begin, length }
                } else {
                    Message::Cancel { index, begin, length }
                }
            }
            MESSAGE_PIECE => {
                if payload.len() < 8 {
                    return Err(Error::Format(format!(
                        "PIECE payload too short: {} bytes",
                        payload.len()
                    )));
                }
                Message::Piece {
                    index: BigEndian::read_u32(&payload[0..4]),
                    begin: BigEndian::read_u32(&payload[4..8]),
                    block: payload[8..].to_vec(),
                }
            }
            MESSAGE_PORT => {
                expect_len("PORT", payload, 2)?;
                Message::Port(BigEndian::read_u16(payload))
            }
            id => Message::Unknown {
                id,
                payload: payload.to_vec(),
            },
        };
        Ok(message)
    }
}

fn expect_len(name: &str, payload: &[u8], len: usize) -> Result<()> {
    if payload.len() != len {
        return Err(Error::Format(format!(
            "{} payload must be {} bytes, got {}",
            name,
            len,
            payload.len()
        )));
    }
    Ok(())
}

/// Reads one length-prefixed message from `reader`.
///
/// # Errors
///
/// - [`Error::Io`] on a short read
/// - [`Error::Format`] if the frame is oversized or its payload is malformed
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let message_len = reader.read_u32::<BigEndian>()? as usize;
    if message_len == 0 {
        return Ok(Message::KeepAlive);
    }
    if message_len > MAX_MESSAGE_LEN {
        return Err(Error::Format(format!("message length {} too large", message_len)));
    }

    let mut message_buf = vec![0; message_len];
    reader.read_exact(&mut message_buf)?;

    Message::decode(message_buf[0], &message_buf[1..])
}

/// Extracts the piece index from a HAVE message.
pub fn parse_have(message: &Message) -> Result<u32> {
    match message {
        Message::Have(index) => Ok(*index),
        other => Err(Error::Format(format!("expected HAVE, got {:?}", other.id()))),
    }
}

/// Copies the block of a PIECE message into `buf`.
///
/// `buf` is the destination buffer for piece `index`. Returns the number of
/// bytes copied.
///
/// # Errors
///
/// Returns [`Error::Format`] if the message is not a PIECE, belongs to a
/// different piece, or its block does not fit inside `buf`.
pub fn parse_piece(index: u32, buf: &mut [u8], message: &Message) -> Result<usize> {
    let (piece_index, begin, block) = match message {
        Message::Piece { index, begin, block } => (*index, *begin as usize, block),
        other => {
            return Err(Error::Format(format!("expected PIECE, got {:?}", other.id())));
        }
    };

    if piece_index != index {
        return Err(Error::Format(format!(
            "expected piece {}, got piece {}",
            index, piece_index
        )));
    }
    if begin >= buf.len() {
        return Err(Error::Format(format!(
            "block offset {} outside piece of {} bytes",
            begin,
            buf.len()
        )));
    }
    if begin + block.len() > buf.len() {
        return Err(Error::Format(format!(
            "block [{}:{}] overflows piece of {} bytes",
            begin,
            begin + block.len(),
            buf.len()
        )));
    }

    buf[begin..begin + block.len()].copy_from_slice(block);
    Ok(block.len())
}
