//! Piece-level data types shared between the swarm coordinator and the
//! per-peer piece downloader: the unit of work, the unit of result, and the
//! presence bitfield peers announce over the wire.

use crate::{error::ProtocolViolation, PieceIndex, RawBitfield, Result, Sha1Hash};

/// One piece's worth of work: what to fetch, and what its bytes must hash
/// to once fetched.
#[derive(Clone, Debug)]
pub struct PieceWork {
    pub index: PieceIndex,
    pub hash: Sha1Hash,
    pub len: u32,
}

/// A piece that has been fully downloaded and found to match its expected
/// hash.
#[derive(Debug)]
pub struct PieceResult {
    pub index: PieceIndex,
    pub buf: Vec<u8>,
}

/// A peer's piece availability, tracked as a bitfield over piece indices.
///
/// The first received bit (MSB of the first byte) corresponds to piece 0.
/// Any trailing bits beyond `piece_count` are padding and are never
/// accessible through [`Bitfield::has`]/[`Bitfield::set`].
///
/// Invariant: `bits.len() == piece_count` always, maintained by both
/// constructors, so `check_index` (which only bounds-checks against
/// `piece_count`) is sufficient to make every other method's indexing safe.
#[derive(Clone, Debug)]
pub struct Bitfield {
    bits: RawBitfield,
    piece_count: usize,
}

impl Bitfield {
    /// Creates an all-absent bitfield for a torrent with `piece_count`
    /// pieces.
    pub fn new(piece_count: usize) -> Self {
        let mut bits = RawBitfield::new();
        bits.resize(piece_count, false);
        Self { bits, piece_count }
    }

    /// Wraps the packed bytes received in a peer's `Bitfield` message.
    ///
    /// The wire payload's length is entirely up to the sending peer: it may
    /// carry more bits than `piece_count` (the last byte is padded out to a
    /// byte boundary, and those bits are simply never addressable), or fewer
    /// — even empty. Either way `bits` is resized to exactly `piece_count`
    /// bits so every index in `0..piece_count` is safe to address; missing
    /// bits default to absent, matching the teacher's `PeerSession` resizing
    /// a received bitfield against the torrent's piece count before use.
    pub fn from_raw_bytes(raw: Vec<u8>, piece_count: usize) -> Self {
        let mut bits = RawBitfield::from_vec(raw);
        bits.resize(piece_count, false);
        Self { bits, piece_count }
    }

    /// The number of pieces this bitfield tracks presence for.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Returns whether the piece at `index` is present.
    ///
    /// Fails with a [`ProtocolViolation`](crate::error::ProtocolViolation)
    /// if `index` is out of range, rather than silently treating it as
    /// absent.
    pub fn has(&self, index: PieceIndex) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.bits[index])
    }

    /// Marks the piece at `index` as present. Idempotent.
    pub fn set(&mut self, index: PieceIndex) -> Result<()> {
        self.check_index(index)?;
        self.bits.set(index, true);
        Ok(())
    }

    /// Returns the packed MSB-first byte representation, suitable for
    /// sending in a `Bitfield` message. Any padding bits are zero.
    pub fn as_raw_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    fn check_index(&self, index: PieceIndex) -> Result<()> {
        if index >= self.piece_count {
            return Err(ProtocolViolation::BitfieldIndexOutOfRange {
                index,
                len: self.piece_count,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_has_is_true() {
        let mut bf = Bitfield::new(9);
        assert!(!bf.has(3).unwrap());
        bf.set(3).unwrap();
        assert!(bf.has(3).unwrap());
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut bf = Bitfield::new(4);
        bf.set(0).unwrap();
        bf.set(0).unwrap();
        assert!(bf.has(0).unwrap());
    }

    #[test]
    fn test_unset_bit_is_false() {
        let bf = Bitfield::new(4);
        assert!(!bf.has(2).unwrap());
    }

    #[test]
    fn test_out_of_range_index_is_protocol_error() {
        let bf = Bitfield::new(4);
        assert!(bf.has(4).is_err());
        let mut bf = bf;
        assert!(bf.set(100).is_err());
    }

    #[test]
    fn test_from_raw_bytes_matches_spec_layout() {
        // 0b1100_0001 means pieces 0, 1 and 7 are present.
        let bf = Bitfield::from_raw_bytes(vec![0b1100_0001], 8);
        assert!(bf.has(0).unwrap());
        assert!(bf.has(1).unwrap());
        assert!(!bf.has(2).unwrap());
        assert!(bf.has(7).unwrap());
    }

    #[test]
    fn test_padding_bits_ignored() {
        // 9 pieces needs 2 bytes; the last 7 bits of byte 1 are padding.
        let bf = Bitfield::from_raw_bytes(vec![0x00, 0x80], 9);
        assert!(bf.has(8).unwrap());
        assert!(bf.has(4).is_ok());
        assert!(bf.has(9).is_err());
    }

    #[test]
    fn test_short_raw_bytes_are_padded_not_panicking() {
        // An empty (or otherwise too-short) payload is a peer sending a
        // degenerate bitfield, not a reason to index out of bounds.
        let bf = Bitfield::from_raw_bytes(Vec::new(), 8);
        for i in 0..8 {
            assert!(!bf.has(i).unwrap());
        }
        assert!(bf.has(8).is_err());
    }

    #[test]
    fn test_long_raw_bytes_are_truncated_to_piece_count() {
        // Two full bytes' worth of bits for a torrent with only 3 pieces.
        let bf = Bitfield::from_raw_bytes(vec![0xff, 0xff], 3);
        assert!(bf.has(0).unwrap());
        assert!(bf.has(2).unwrap());
        assert!(bf.has(3).is_err());
    }
}
