// needed by the `select!` macro reaching the default recursion limit
#![recursion_limit = "256"]

pub mod conf;
mod download;
pub mod error;
pub mod metainfo;
mod peer;
mod piece;
pub mod swarm;
mod wire;

use bitvec::prelude::{BitVec, Msb0};
use rand::Rng;

pub use conf::Conf;
pub use error::{Error, Result};
pub use metainfo::{PeerAddress, TorrentSpec};
pub use piece::{PieceResult, PieceWork};
pub use swarm::Swarm;

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, but in
/// the source code we use `usize` to be consistent with other index types in
/// Rust.
pub type PieceIndex = usize;

/// The peer ID is an arbitrary 20 byte string.
///
/// Guidelines for choosing a peer ID: http://bittorrent.org/beps/bep_0020.html.
pub type PeerId = [u8; 20];

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// The raw bit vector backing [`piece::Bitfield`], most significant bit
/// first: the highest bit of byte 0 represents piece 0 (e.g. `0b1100_0001`
/// means pieces 0, 1 and 7 are present).
pub(crate) type RawBitfield = BitVec<Msb0, u8>;

/// This is the only block length we're dealing with (except for possibly the
/// last block of a piece). It is the widely used and accepted 16 KiB.
pub const BLOCK_LEN: u32 = 0x4000;

/// The number of block requests a session keeps outstanding ("in its
/// pipeline") at any given time, so the link stays saturated while waiting
/// for a peer's replies.
pub const MAX_BACKLOG: usize = 5;

/// A block is a fixed size chunk of a piece, which in turn is a fixed size
/// chunk of a torrent. Downloading torrents happens at this block level
/// granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BlockInfo {
    /// The index of the piece of which this is a block.
    pub piece_index: PieceIndex,
    /// The zero-based byte offset into the piece.
    pub offset: u32,
    /// The block's length in bytes. Always [`BLOCK_LEN`], except for
    /// possibly the last block in a piece.
    pub len: u32,
}

/// Returns the length of the block at `offset` bytes into a piece of
/// `piece_len` bytes.
///
/// # Panics
///
/// Panics if `offset` is not smaller than `piece_len`.
pub(crate) fn block_len(piece_len: u32, offset: u32) -> u32 {
    assert!(piece_len > offset);
    std::cmp::min(piece_len - offset, BLOCK_LEN)
}

/// Generates a new random 20 byte peer ID, stable for the lifetime of one
/// download.
///
/// See [`PeerId`] and the guidelines at
/// http://bittorrent.org/beps/bep_0020.html.
pub fn generate_peer_id() -> PeerId {
    let mut id = [0u8; 20];
    rand::thread_rng().fill(&mut id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    // An arbitrary piece length that is an exact multiple of the canonical
    // block length (16 KiB).
    const BLOCK_LEN_MULTIPLE_PIECE_LEN: u32 = 2 * BLOCK_LEN;

    // An arbitrary piece length that is _not_ a multiple of the canonical
    // block length, and the amount by which it overlaps the nearest exact
    // multiple.
    const OVERLAP: u32 = 234;
    const UNEVEN_PIECE_LEN: u32 = 2 * BLOCK_LEN + OVERLAP;

    #[test]
    fn test_block_len() {
        assert_eq!(block_len(BLOCK_LEN_MULTIPLE_PIECE_LEN, 0), BLOCK_LEN);
        assert_eq!(
            block_len(BLOCK_LEN_MULTIPLE_PIECE_LEN, BLOCK_LEN),
            BLOCK_LEN
        );

        assert_eq!(block_len(UNEVEN_PIECE_LEN, 0), BLOCK_LEN);
        assert_eq!(block_len(UNEVEN_PIECE_LEN, BLOCK_LEN), BLOCK_LEN);
        assert_eq!(block_len(UNEVEN_PIECE_LEN, 2 * BLOCK_LEN), OVERLAP);
    }

    #[test]
    #[should_panic]
    fn test_block_len_invalid_offset_panics() {
        block_len(BLOCK_LEN_MULTIPLE_PIECE_LEN, BLOCK_LEN_MULTIPLE_PIECE_LEN);
    }

    #[test]
    fn test_generate_peer_id_is_20_bytes() {
        let id = generate_peer_id();
        assert_eq!(id.len(), 20);
    }
}
