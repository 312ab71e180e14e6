use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::ProtocolViolation, Error, PeerId, Sha1Hash};

/// The protocol string every compliant handshake carries. We don't validate
/// peers send exactly this (per spec, no other validation of `pstr` is
/// required), but it's what we send ourselves.
pub(crate) const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// The fixed-layout handshake frame peers exchange before anything else:
/// `pstrlen(1) | pstr(pstrlen) | reserved(8) | info_hash(20) | peer_id(20)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Handshake {
    pub prot: Vec<u8>,
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
}

impl Handshake {
    /// Builds the handshake we send: the canonical protocol string for the
    /// given info hash and our peer id.
    pub fn new(info_hash: Sha1Hash, peer_id: PeerId) -> Self {
        Self {
            prot: PROTOCOL_STRING.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }
}

/// Codec for the handshake frame, used only for the first exchange on a
/// connection before it is switched to [`super::PeerCodec`].
pub(crate) struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(
        &mut self,
        handshake: Handshake,
        buf: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let Handshake {
            prot,
            info_hash,
            peer_id,
        } = handshake;
        buf.reserve(49 + prot.len());
        buf.put_u8(prot.len() as u8);
        buf.put_slice(&prot);
        buf.put_slice(&[0u8; 8]);
        buf.put_slice(&info_hash);
        buf.put_slice(&peer_id);
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        let pstrlen = buf[0] as usize;
        if pstrlen == 0 {
            return Err(ProtocolViolation::EmptyProtocolString.into());
        }

        let frame_len = 1 + 48 + pstrlen;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(frame_len);
        frame.advance(1); // pstrlen
        let prot = frame.split_to(pstrlen).to_vec();
        frame.advance(8); // reserved

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&frame.split_to(20));
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&frame.split_to(20));

        Ok(Some(Handshake {
            prot,
            info_hash,
            peer_id,
        }))
    }
}
