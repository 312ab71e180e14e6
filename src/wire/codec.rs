use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::ProtocolViolation, BlockInfo, Error, PieceIndex};

/// The numeric message IDs defined by the peer wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

/// A decoded peer protocol message. A length prefix of 0 decodes to
/// [`Message::KeepAlive`] rather than being surfaced as an `Option` at this
/// layer, so callers always get a concrete value per frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { index: PieceIndex },
    Bitfield(Vec<u8>),
    Request(BlockInfo),
    Piece { piece_index: PieceIndex, offset: u32, data: Vec<u8> },
    Cancel(BlockInfo),
    /// A message with an ID outside 0..=8, kept opaque. The piece
    /// downloader ignores these.
    Unknown { id: u8, payload: Vec<u8> },
}

impl Message {
    /// A human-readable name for logging, independent of payload contents.
    pub fn name(&self) -> &'static str {
        match self {
            Message::KeepAlive => "KeepAlive",
            Message::Choke => "Choke",
            Message::Unchoke => "Unchoke",
            Message::Interested => "Interested",
            Message::NotInterested => "NotInterested",
            Message::Have { .. } => "Have",
            Message::Bitfield(_) => "Bitfield",
            Message::Request(_) => "Request",
            Message::Piece { .. } => "Piece",
            Message::Cancel(_) => "Cancel",
            Message::Unknown { .. } => "Unknown",
        }
    }
}

/// Codec for framed peer protocol messages, used for the lifetime of a
/// session after the handshake has completed.
pub(crate) struct PeerCodec;

fn put_fixed_id(buf: &mut BytesMut, id: MessageId) {
    buf.put_u32(1);
    buf.put_u8(id as u8);
}

fn put_block_info(buf: &mut BytesMut, id: MessageId, block: &BlockInfo) {
    buf.put_u32(13);
    buf.put_u8(id as u8);
    buf.put_u32(block.piece_index as u32);
    buf.put_u32(block.offset);
    buf.put_u32(block.len);
}

impl Encoder<Message> for PeerCodec {
    type Error = Error;

    fn encode(
        &mut self,
        msg: Message,
        buf: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        match msg {
            Message::KeepAlive => buf.put_u32(0),
            Message::Choke => put_fixed_id(buf, MessageId::Choke),
            Message::Unchoke => put_fixed_id(buf, MessageId::Unchoke),
            Message::Interested => put_fixed_id(buf, MessageId::Interested),
            Message::NotInterested => {
                put_fixed_id(buf, MessageId::NotInterested)
            }
            Message::Have { index } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(index as u32);
            }
            Message::Bitfield(bytes) => {
                buf.put_u32(1 + bytes.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(&bytes);
            }
            Message::Request(block) => {
                put_block_info(buf, MessageId::Request, &block)
            }
            Message::Piece {
                piece_index,
                offset,
                data,
            } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(piece_index as u32);
                buf.put_u32(offset);
                buf.put_slice(&data);
            }
            Message::Cancel(block) => {
                put_block_info(buf, MessageId::Cancel, &block)
            }
            Message::Unknown { id, payload } => {
                buf.put_u32(1 + payload.len() as u32);
                buf.put_u8(id);
                buf.put_slice(&payload);
            }
        }
        Ok(())
    }
}

fn parse_block_info(payload: &[u8]) -> Result<BlockInfo, Error> {
    if payload.len() != 12 {
        return Err(ProtocolViolation::InvalidRequestLength(payload.len()).into());
    }
    let piece_index =
        u32::from_be_bytes(payload[0..4].try_into().unwrap()) as PieceIndex;
    let offset = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    let len = u32::from_be_bytes(payload[8..12].try_into().unwrap());
    Ok(BlockInfo {
        piece_index,
        offset,
        len,
    })
}

impl Decoder for PeerCodec {
    type Item = Message;
    type Error = Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        if buf.len() < 4 {
            buf.reserve(4);
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[0..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len == 0 {
            buf.advance(4);
            return Ok(Some(Message::KeepAlive));
        }

        if buf.len() < 4 + len {
            buf.reserve(4 + len - buf.len());
            return Ok(None);
        }

        buf.advance(4);
        let mut payload = buf.split_to(len);
        let id = payload[0];
        payload.advance(1);

        let msg = match id {
            id if id == MessageId::Choke as u8 => Message::Choke,
            id if id == MessageId::Unchoke as u8 => Message::Unchoke,
            id if id == MessageId::Interested as u8 => Message::Interested,
            id if id == MessageId::NotInterested as u8 => {
                Message::NotInterested
            }
            id if id == MessageId::Have as u8 => {
                if payload.len() != 4 {
                    return Err(ProtocolViolation::InvalidHaveLength(
                        payload.len(),
                    )
                    .into());
                }
                let mut idx_bytes = [0u8; 4];
                idx_bytes.copy_from_slice(&payload);
                Message::Have {
                    index: u32::from_be_bytes(idx_bytes) as PieceIndex,
                }
            }
            id if id == MessageId::Bitfield as u8 => {
                Message::Bitfield(payload.to_vec())
            }
            id if id == MessageId::Request as u8 => {
                Message::Request(parse_block_info(&payload)?)
            }
            id if id == MessageId::Piece as u8 => {
                if payload.len() < 8 {
                    return Err(ProtocolViolation::PieceHeaderTooShort(
                        payload.len(),
                    )
                    .into());
                }
                let piece_index = u32::from_be_bytes(
                    payload[0..4].try_into().unwrap(),
                ) as PieceIndex;
                let offset =
                    u32::from_be_bytes(payload[4..8].try_into().unwrap());
                let data = payload[8..].to_vec();
                Message::Piece {
                    piece_index,
                    offset,
                    data,
                }
            }
            id if id == MessageId::Cancel as u8 => {
                Message::Cancel(parse_block_info(&payload)?)
            }
            other => Message::Unknown {
                id: other,
                payload: payload.to_vec(),
            },
        };

        Ok(Some(msg))
    }
}
