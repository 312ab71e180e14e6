//! This module defines types used to configure the engine and its parts.

use std::time::Duration;

use crate::{PeerId, BLOCK_LEN, MAX_BACKLOG};

/// The default client id this engine announces to peers when none is
/// supplied by the caller.
pub const DEFAULT_CLIENT_ID: &PeerId = b"cbt-0000000000000000";

/// The global configuration for the swarm coordinator and the sessions it
/// spawns.
#[derive(Clone, Copy, Debug)]
pub struct Conf {
    /// The ID of the client to announce to peers in the handshake.
    pub client_id: PeerId,
    /// The deadline applied independently to each of a session's three
    /// setup stages — TCP connect, handshake exchange, and the subsequent
    /// bitfield read — cleared on each stage's completion rather than
    /// shared across all three.
    pub establish_timeout: Duration,
    /// The deadline covering an entire piece download, from the first
    /// request to the last block received.
    pub piece_timeout: Duration,
    /// The largest block size we will ever request, in bytes.
    pub max_block_len: u32,
    /// The number of block requests a session keeps outstanding at once.
    pub max_backlog: usize,
}

impl Conf {
    /// Returns the engine configuration with the spec's reasonable
    /// defaults, using [`DEFAULT_CLIENT_ID`] as the client id.
    pub fn new() -> Self {
        Self {
            client_id: *DEFAULT_CLIENT_ID,
            // 3 seconds, per the spec: generous enough for a TCP round trip
            // and a handshake/bitfield exchange on a loaded link, short
            // enough to not stall the worker pool on a dead peer.
            establish_timeout: Duration::from_secs(3),
            // 30 seconds: long enough to fetch a whole piece at modest
            // throughput, short enough to bound how long a stalled peer can
            // hold a piece hostage.
            piece_timeout: Duration::from_secs(30),
            max_block_len: BLOCK_LEN,
            max_backlog: MAX_BACKLOG,
        }
    }

    /// Returns a copy of this configuration with the given client id.
    pub fn with_client_id(mut self, client_id: PeerId) -> Self {
        self.client_id = client_id;
        self
    }
}

impl Default for Conf {
    fn default() -> Self {
        Self::new()
    }
}
