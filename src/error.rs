//! The crate-wide error type and the taxonomy peer sessions, the piece
//! downloader and the swarm coordinator report against.

use std::fmt;

use crate::PieceIndex;

/// The crate-wide result type, aliased the same way as in the teacher's
/// `error` module so call sites only need `use crate::error::*`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while downloading a torrent.
#[derive(Debug)]
pub enum Error {
    /// A socket failure, a short read, a closed connection, or an operation
    /// that didn't complete within its deadline.
    Io(std::io::Error),
    /// A deadline elapsed before an operation (connect, handshake, bitfield
    /// exchange, or a whole piece download) completed.
    Timeout,
    /// A framing or semantic violation of the peer wire protocol: a bad
    /// pstrlen, a malformed message payload, an out-of-range block, or an
    /// unexpected message where a specific one was required.
    Protocol(ProtocolViolation),
    /// The handshake we received doesn't carry the info hash we're
    /// downloading.
    InfoHashMismatch,
    /// A fully received piece's SHA-1 digest doesn't match the expected
    /// hash from [`TorrentSpec::piece_hashes`](crate::metainfo::TorrentSpec).
    Integrity { index: PieceIndex },
    /// A piece index is not within `0..piece_count`.
    InvalidPieceIndex(PieceIndex),
    /// The work or result channel was closed unexpectedly.
    ChannelClosed,
    /// No connected peer announced the given piece in its bitfield, and the
    /// work queue is otherwise exhausted.
    SwarmEmpty,
}

/// The specific wire-protocol contract that was violated.
#[derive(Debug)]
pub enum ProtocolViolation {
    /// The handshake's `pstrlen` field was zero.
    EmptyProtocolString,
    /// A `Have` message's payload wasn't exactly 4 bytes.
    InvalidHaveLength(usize),
    /// A `Request` or `Cancel` message's payload wasn't exactly 12 bytes.
    InvalidRequestLength(usize),
    /// A `Piece` message's payload was shorter than the 8 byte index+begin
    /// header.
    PieceHeaderTooShort(usize),
    /// A `Piece` message's index didn't match the piece we requested it for.
    PieceIndexMismatch { expected: PieceIndex, got: PieceIndex },
    /// A `Piece` message's `begin` offset fell outside the piece buffer.
    BeginOutOfRange { begin: u32, piece_len: u32 },
    /// A `Piece` message's block ran past the end of the piece buffer.
    BlockOutOfRange { begin: u32, block_len: u32, piece_len: u32 },
    /// The peer sent something other than a bitfield as the first message
    /// after the handshake.
    ExpectedBitfield,
    /// An out-of-range piece index was passed to a bitfield operation.
    BitfieldIndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Protocol(p) => write!(f, "protocol error: {}", p),
            Error::InfoHashMismatch => {
                write!(f, "peer handshake advertised a different info hash")
            }
            Error::Integrity { index } => {
                write!(f, "piece {} failed integrity check", index)
            }
            Error::InvalidPieceIndex(index) => {
                write!(f, "piece index {} is out of range", index)
            }
            Error::ChannelClosed => write!(f, "channel closed unexpectedly"),
            Error::SwarmEmpty => {
                write!(f, "no connected peer has the pieces we need")
            }
        }
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::EmptyProtocolString => {
                write!(f, "handshake pstrlen must not be 0")
            }
            ProtocolViolation::InvalidHaveLength(len) => {
                write!(f, "expected have payload length 4, got {}", len)
            }
            ProtocolViolation::InvalidRequestLength(len) => {
                write!(f, "expected request/cancel payload length 12, got {}", len)
            }
            ProtocolViolation::PieceHeaderTooShort(len) => {
                write!(f, "piece payload too short: {} < 8", len)
            }
            ProtocolViolation::PieceIndexMismatch { expected, got } => {
                write!(f, "expected piece index {}, got {}", expected, got)
            }
            ProtocolViolation::BeginOutOfRange { begin, piece_len } => write!(
                f,
                "begin offset {} is out of range for piece of length {}",
                begin, piece_len
            ),
            ProtocolViolation::BlockOutOfRange {
                begin,
                block_len,
                piece_len,
            } => write!(
                f,
                "block of length {} at offset {} exceeds piece length {}",
                block_len, begin, piece_len
            ),
            ProtocolViolation::ExpectedBitfield => {
                write!(f, "expected bitfield as first message after handshake")
            }
            ProtocolViolation::BitfieldIndexOutOfRange { index, len } => write!(
                f,
                "bitfield index {} is out of range for a {} bit bitfield",
                index, len
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolViolation {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio::time::Elapsed> for Error {
    fn from(_: tokio::time::Elapsed) -> Self {
        Error::Timeout
    }
}

impl From<ProtocolViolation> for Error {
    fn from(v: ProtocolViolation) -> Self {
        Error::Protocol(v)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
