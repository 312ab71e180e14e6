//! The typed inputs this engine accepts from its external collaborators.
//!
//! Parsing the bencoded metainfo file and speaking to the tracker are
//! outside this crate's scope; callers are expected to produce a
//! [`TorrentSpec`] and a peer list themselves (e.g. with a bencode crate and
//! an HTTP client) and hand them to [`crate::swarm::Swarm`].

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddrV4},
};

use crate::{PieceIndex, Sha1Hash};

/// Everything the engine needs to know about a single-file torrent in order
/// to download it, as produced by an external metainfo parser.
#[derive(Clone, Debug)]
pub struct TorrentSpec {
    /// The tracker's announce URL. The engine never dereferences this; it is
    /// carried only so callers don't need a second struct to pass it around.
    pub announce: String,
    /// SHA-1 over the bencoded `info` dictionary; identifies the swarm.
    pub info_hash: Sha1Hash,
    /// SHA-1 digest of each piece, in piece order.
    pub piece_hashes: Vec<Sha1Hash>,
    /// The uniform length of every piece except the last.
    pub piece_len: u32,
    /// The total length of the downloaded file, in bytes.
    pub len: u64,
    /// The torrent's advertised name.
    pub name: String,
}

impl TorrentSpec {
    /// The number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Returns the length of the piece at `index`.
    ///
    /// All pieces are [`TorrentSpec::piece_len`] bytes except the last,
    /// which is `len - (piece_count - 1) * piece_len`.
    pub fn piece_len(&self, index: PieceIndex) -> crate::Result<u32> {
        let piece_count = self.piece_count();
        if index >= piece_count {
            return Err(crate::Error::InvalidPieceIndex(index));
        }
        if index == piece_count - 1 {
            let full_pieces_len =
                self.piece_len as u64 * (piece_count - 1) as u64;
            Ok((self.len - full_pieces_len) as u32)
        } else {
            Ok(self.piece_len)
        }
    }

    /// Returns the half-open byte range `[begin, end)` piece `index`
    /// occupies in the assembled file.
    pub fn piece_bounds(&self, index: PieceIndex) -> std::ops::Range<u64> {
        let begin = index as u64 * self.piece_len as u64;
        let end = std::cmp::min(begin + self.piece_len as u64, self.len);
        begin..end
    }
}

/// A peer's IPv4 address and port, as unmarshalled from the tracker's
/// compact peer blob (4 bytes of address, 2 bytes of big-endian port).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddress(pub SocketAddrV4);

impl PeerAddress {
    /// Builds a peer address from an IPv4 address and port.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PeerAddress> for std::net::SocketAddr {
    fn from(addr: PeerAddress) -> Self {
        std::net::SocketAddr::V4(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(len: u64, piece_len: u32, piece_count: usize) -> TorrentSpec {
        TorrentSpec {
            announce: "http://example.test/announce".to_owned(),
            info_hash: [0u8; 20],
            piece_hashes: vec![[0u8; 20]; piece_count],
            piece_len,
            len,
            name: "test".to_owned(),
        }
    }

    #[test]
    fn test_piece_bounds_sum_to_total_length() {
        // 3 full pieces of 8 bytes, one last piece of 4.
        let spec = spec(28, 8, 4);
        let total: u64 = (0..spec.piece_count())
            .map(|i| {
                let bounds = spec.piece_bounds(i);
                bounds.end - bounds.start
            })
            .sum();
        assert_eq!(total, spec.len);
    }

    #[test]
    fn test_piece_bounds_last_piece_is_short() {
        let spec = spec(20, 8, 3);
        assert_eq!(spec.piece_bounds(0), 0..8);
        assert_eq!(spec.piece_bounds(1), 8..16);
        assert_eq!(spec.piece_bounds(2), 16..20);
        assert_eq!(spec.piece_len(2).unwrap(), 4);
    }

    #[test]
    fn test_piece_len_out_of_range() {
        let spec = spec(20, 8, 3);
        assert!(spec.piece_len(3).is_err());
    }
}
