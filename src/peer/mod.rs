//! A session with a single connected peer: handshake establishment, and
//! framed send/receive of protocol messages.

mod session;

pub(crate) use session::PeerSession;
