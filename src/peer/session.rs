use std::{
    io::{Error as IoError, ErrorKind},
    net::SocketAddr,
};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::{Framed, FramedParts};

use crate::{
    conf::Conf,
    error::ProtocolViolation,
    piece::Bitfield,
    wire::{Handshake, HandshakeCodec, Message, PeerCodec},
    BlockInfo, Error, PeerId, PieceIndex, Result, Sha1Hash,
};

/// A session with one connected peer: the TCP stream, the peer's announced
/// piece availability, and our choked state with respect to them.
///
/// A session is created per worker, lives for that worker's duration, and is
/// torn down (by dropping the socket) on any I/O or protocol failure.
pub(crate) struct PeerSession {
    addr: SocketAddr,
    socket: Framed<TcpStream, PeerCodec>,
    bitfield: Bitfield,
    /// Whether the peer has us choked. Peers start off choking us.
    choked: bool,
}

impl PeerSession {
    /// Dials `addr`, exchanges the handshake, and waits for the peer's
    /// initial bitfield.
    ///
    /// Each of the three stages — dial, handshake, bitfield read — gets its
    /// own independent `conf.establish_timeout` deadline, cleared on that
    /// stage's completion, rather than one combined budget for all three;
    /// a peer that is merely slow at one stage shouldn't be penalized for
    /// time already spent completing an earlier one.
    ///
    /// Fails if the peer's handshake advertises a different info hash, or if
    /// the first message received isn't a bitfield.
    pub async fn establish(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        peer_id: PeerId,
        piece_count: usize,
        conf: &Conf,
    ) -> Result<Self> {
        log::info!("Connecting to peer {}", addr);
        let socket = timeout(conf.establish_timeout, TcpStream::connect(addr)).await??;
        log::info!("Connected to peer {}", addr);

        let socket = timeout(
            conf.establish_timeout,
            Self::exchange_handshake(socket, addr, info_hash, peer_id),
        )
        .await??;

        let (socket, bitfield) = timeout(
            conf.establish_timeout,
            Self::recv_bitfield(socket, addr, piece_count),
        )
        .await??;

        Ok(Self {
            addr,
            socket,
            bitfield,
            choked: true,
        })
    }

    async fn exchange_handshake(
        socket: TcpStream,
        addr: SocketAddr,
        info_hash: Sha1Hash,
        peer_id: PeerId,
    ) -> Result<Framed<TcpStream, PeerCodec>> {
        let mut socket = Framed::new(socket, HandshakeCodec);

        let handshake = Handshake::new(info_hash, peer_id);
        log::info!("Sending handshake to peer {}", addr);
        socket.send(handshake).await?;

        log::info!("Waiting for peer {} handshake", addr);
        let peer_handshake = socket
            .next()
            .await
            .ok_or_else(|| Error::Io(connection_closed("handshake")))??;
        log::debug!("Peer {} handshake: {:?}", addr, peer_handshake);

        if peer_handshake.info_hash != info_hash {
            log::warn!(
                "Peer {} handshake advertised info hash {}, expected {}",
                addr,
                hex::encode(peer_handshake.info_hash),
                hex::encode(info_hash)
            );
            return Err(Error::InfoHashMismatch);
        }

        // Switch from the handshake codec to the message codec, carrying
        // over any bytes the peer already sent past its handshake.
        let old_parts = socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, PeerCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        Ok(Framed::from_parts(new_parts))
    }

    async fn recv_bitfield(
        mut socket: Framed<TcpStream, PeerCodec>,
        addr: SocketAddr,
        piece_count: usize,
    ) -> Result<(Framed<TcpStream, PeerCodec>, Bitfield)> {
        log::info!("Waiting for peer {} bitfield", addr);
        let msg = socket
            .next()
            .await
            .ok_or_else(|| Error::Io(connection_closed("bitfield")))??;
        let bitfield = match msg {
            Message::Bitfield(raw) => Bitfield::from_raw_bytes(raw, piece_count),
            other => {
                log::warn!(
                    "Peer {} sent {} instead of a bitfield",
                    addr,
                    other.name()
                );
                return Err(ProtocolViolation::ExpectedBitfield.into());
            }
        };
        Ok((socket, bitfield))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn set_choked(&mut self, choked: bool) {
        self.choked = choked;
    }

    /// Returns whether the peer has announced the given piece, via its
    /// handshake-time bitfield as updated by later `Have` messages.
    pub fn has_piece(&self, index: PieceIndex) -> Result<bool> {
        self.bitfield.has(index)
    }

    /// Records a `Have` announcement for `index` in the peer's bitfield.
    pub fn mark_have(&mut self, index: PieceIndex) -> Result<()> {
        self.bitfield.set(index)
    }

    /// Reads and returns exactly one framed message, performing no
    /// interpretation of its contents.
    pub async fn read_message(&mut self) -> Result<Message> {
        self.socket
            .next()
            .await
            .ok_or_else(|| Error::Io(connection_closed("message")))?
    }

    pub async fn send_request(
        &mut self,
        piece_index: PieceIndex,
        offset: u32,
        len: u32,
    ) -> Result<()> {
        self.socket
            .send(Message::Request(BlockInfo {
                piece_index,
                offset,
                len,
            }))
            .await
    }

    pub async fn send_interested(&mut self) -> Result<()> {
        self.socket.send(Message::Interested).await
    }

    pub async fn send_not_interested(&mut self) -> Result<()> {
        self.socket.send(Message::NotInterested).await
    }

    pub async fn send_unchoke(&mut self) -> Result<()> {
        self.socket.send(Message::Unchoke).await
    }

    pub async fn send_choke(&mut self) -> Result<()> {
        self.socket.send(Message::Choke).await
    }

    pub async fn send_have(&mut self, index: PieceIndex) -> Result<()> {
        self.socket.send(Message::Have { index }).await
    }
}

fn connection_closed(during: &str) -> IoError {
    IoError::new(
        ErrorKind::UnexpectedEof,
        format!("peer closed connection during {}", during),
    )
}
