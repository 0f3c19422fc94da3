//! # Piece Availability Bitfield
//!
//! Compact bit-set with one bit per piece, as carried by BITFIELD messages.
//!
//! ```text
//! Byte 0: [piece 0, 1, 2, 3, 4, 5, 6, 7]   (MSB first)
//! Byte 1: [piece 8, 9, 10, 11, 12, 13, 14, 15]
//! ...
//! ```
//!
//! The size is fixed by the bytes the peer sent. Indices past the end are
//! reported as missing and setting them is a no-op.

/// Which pieces a remote peer holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
}

impl Bitfield {
    /// Wraps raw BITFIELD payload bytes.
    pub fn from_bytes(bits: Vec<u8>) -> Self {
        Bitfield { bits }
    }

    /// Creates an empty bitfield able to describe `piece_count` pieces.
    pub fn with_capacity(piece_count: usize) -> Self {
        Bitfield {
            bits: vec![0; piece_count.div_ceil(8)],
        }
    }

    /// Returns true if the peer has piece `index`.
    pub fn has_piece(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        match self.bits.get(byte_index) {
            Some(byte) => byte >> (7 - offset) & 1 != 0,
            None => false,
        }
    }

    /// Marks piece `index` as held by the peer.
    pub fn set_piece(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        if let Some(byte) = self.bits.get_mut(byte_index) {
            *byte |= 1 << (7 - offset);
        }
    }

    /// Raw MSB-first bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first_layout() {
        let bitfield = Bitfield::from_bytes(vec![0b1010_0000, 0b0000_0001]);
        assert!(bitfield.has_piece(0));
        assert!(!bitfield.has_piece(1));
        assert!(bitfield.has_piece(2));
        assert!(!bitfield.has_piece(8));
        assert!(bitfield.has_piece(15));
    }

    #[test]
    fn set_then_has_for_every_slot() {
        let mut bitfield = Bitfield::with_capacity(20);
        assert_eq!(bitfield.as_bytes().len(), 3);
        for i in 0..24 {
            assert!(!bitfield.has_piece(i));
            bitfield.set_piece(i);
            assert!(bitfield.has_piece(i));
        }
        assert_eq!(bitfield.as_bytes(), &[0xff, 0xff, 0xff]);
    }

    #[test]
    fn set_piece_leaves_neighbours_alone() {
        let mut bitfield = Bitfield::with_capacity(16);
        bitfield.set_piece(9);
        assert_eq!(bitfield.as_bytes(), &[0b0000_0000, 0b0100_0000]);
    }

    #[test]
    fn out_of_range_is_harmless() {
        let mut bitfield = Bitfield::from_bytes(vec![0xff]);
        assert!(!bitfield.has_piece(8));
        assert!(!bitfield.has_piece(u32::MAX));

        bitfield.set_piece(8);
        bitfield.set_piece(u32::MAX);
        assert_eq!(bitfield.as_bytes(), &[0xff]);

        let empty = Bitfield::default();
        assert!(empty.as_bytes().is_empty());
        assert!(!empty.has_piece(0));
    }
}
