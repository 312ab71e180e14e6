//! The peer wire protocol: handshake framing and the length-prefixed
//! message codec built on top of it.
//!
//! [`PeerSession`](crate::peer::PeerSession) starts a connection with a
//! [`HandshakeCodec`], then, once the handshake is exchanged, switches the
//! same socket to a [`PeerCodec`] for the lifetime of the session — carrying
//! over any buffered bytes the peer may have sent right after its
//! handshake, the same way the teacher's `PeerSession::start` reuses
//! `FramedParts` across the codec switch.

mod codec;
mod handshake;

pub(crate) use codec::{Message, MessageId, PeerCodec};
pub(crate) use handshake::{Handshake, HandshakeCodec, PROTOCOL_STRING};
