//! The swarm coordinator: holds the work queue and result sink, spawns one
//! worker task per peer, and assembles verified pieces into the output
//! buffer.

use std::{net::SocketAddr, sync::Arc};

use tokio::sync::{mpsc, Mutex};

use crate::{
    download::{check_integrity, download_piece},
    metainfo::{PeerAddress, TorrentSpec},
    peer::PeerSession,
    piece::{PieceResult, PieceWork},
    Conf, Error, Result,
};

/// Drives the download of a single-file torrent across a swarm of peers.
///
/// Construct with [`Swarm::new`], then call [`Swarm::download`] with the
/// initial peer list (as produced by an external tracker client) to run the
/// download to completion. The peer id announced in every session's
/// handshake is `conf.client_id`; use [`crate::generate_peer_id`] with
/// [`Conf::with_client_id`] to announce a fresh random one per run.
pub struct Swarm {
    spec: TorrentSpec,
    conf: Conf,
}

impl Swarm {
    /// Creates a coordinator for `spec`, using the default [`Conf`].
    pub fn new(spec: TorrentSpec) -> Self {
        Self {
            spec,
            conf: Conf::default(),
        }
    }

    /// Overrides the engine configuration.
    pub fn with_conf(mut self, conf: Conf) -> Self {
        self.conf = conf;
        self
    }

    /// Downloads every piece of the torrent from `peers`, spawning one
    /// worker task per peer, and returns the assembled file content.
    ///
    /// Returns as soon as every piece has been verified and copied into the
    /// output buffer; workers that are still running at that point continue
    /// to wind down in the background as their connections close.
    pub async fn download(self, peers: Vec<PeerAddress>) -> Result<Vec<u8>> {
        let piece_count = self.spec.piece_count();
        let mut buf = vec![0u8; self.spec.len as usize];
        if piece_count == 0 {
            return Ok(buf);
        }

        // Capacity equals the piece count so the initial seeding below, and
        // every subsequent re-enqueue by a worker, can never block.
        let (mut work_tx, work_rx) = mpsc::channel::<PieceWork>(piece_count);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<PieceResult>();

        for index in 0..piece_count {
            let work = PieceWork {
                index,
                hash: self.spec.piece_hashes[index],
                len: self.spec.piece_len(index)?,
            };
            work_tx
                .send(work)
                .await
                .map_err(|_| Error::ChannelClosed)?;
        }

        log::info!(
            "Starting download of {} ({} pieces, {} peers, info hash {})",
            self.spec.name,
            piece_count,
            peers.len(),
            hex::encode(self.spec.info_hash)
        );

        for peer in peers {
            let worker = Worker {
                addr: peer.into(),
                info_hash: self.spec.info_hash,
                piece_count,
                conf: self.conf,
                work_tx: work_tx.clone(),
                work_rx: Arc::clone(&work_rx),
                result_tx: result_tx.clone(),
            };
            tokio::spawn(worker.run());
        }
        // Drop our own handles so the channels close once every worker has
        // dropped theirs (on completion or abandonment).
        drop(work_tx);
        drop(result_tx);

        let mut done = 0usize;
        while done < piece_count {
            let result = result_rx.recv().await.ok_or(Error::ChannelClosed)?;
            let bounds = self.spec.piece_bounds(result.index);
            let start = bounds.start as usize;
            let end = bounds.end as usize;
            buf[start..end].copy_from_slice(&result.buf);
            done += 1;
            log::info!(
                "({:.2}%) downloaded piece {} ({}/{})",
                done as f64 / piece_count as f64 * 100.0,
                result.index,
                done,
                piece_count
            );
        }

        Ok(buf)
    }
}

/// Per-peer worker state: one spawned per [`PeerAddress`], each running
/// independently against the shared work and result channels.
struct Worker {
    addr: SocketAddr,
    info_hash: crate::Sha1Hash,
    piece_count: usize,
    conf: Conf,
    work_tx: mpsc::Sender<PieceWork>,
    work_rx: Arc<Mutex<mpsc::Receiver<PieceWork>>>,
    result_tx: mpsc::UnboundedSender<PieceResult>,
}

impl Worker {
    async fn run(mut self) {
        let mut session = match PeerSession::establish(
            self.addr,
            self.info_hash,
            self.conf.client_id,
            self.piece_count,
            &self.conf,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                log::info!(
                    "Could not establish session with {}: {}. Abandoning peer.",
                    self.addr,
                    e
                );
                return;
            }
        };

        if let Err(e) = session.send_unchoke().await {
            log::info!(
                "Peer {} unchoke failed: {}. Abandoning peer.",
                self.addr,
                e
            );
            return;
        }
        if let Err(e) = session.send_interested().await {
            log::info!(
                "Peer {} interested failed: {}. Abandoning peer.",
                self.addr,
                e
            );
            return;
        }

        self.serve_work(&mut session).await;

        log::info!("Worker for peer {} exiting", self.addr);
    }

    /// Repeatedly takes work from the shared queue until it closes, or until
    /// this peer is abandoned due to an I/O or protocol failure.
    async fn serve_work(&mut self, session: &mut PeerSession) {
        loop {
            let work = {
                let mut rx = self.work_rx.lock().await;
                match rx.recv().await {
                    Some(work) => work,
                    None => return,
                }
            };

            let has_piece = session.has_piece(work.index).unwrap_or(false);
            if !has_piece {
                if self.work_tx.send(work).await.is_err() {
                    return;
                }
                continue;
            }

            match download_piece(session, &work, &self.conf).await {
                Ok(result) => {
                    if let Err(e) =
                        check_integrity(work.index, &work.hash, &result.buf)
                    {
                        log::warn!(
                            "Piece {} failed integrity check from peer {}: {}",
                            work.index,
                            self.addr,
                            e
                        );
                        if self.work_tx.send(work).await.is_err() {
                            return;
                        }
                        continue;
                    }

                    // The Have announcement is a courtesy to the peer, not
                    // a precondition for delivering the already-verified
                    // result: we still push it even if the send fails, and
                    // only then abandon a connection we now suspect is
                    // dead.
                    let have_failed =
                        session.send_have(work.index).await.is_err();
                    if have_failed {
                        log::info!(
                            "Peer {} have failed after piece {}. Abandoning peer.",
                            self.addr,
                            result.index
                        );
                    }
                    if self.result_tx.send(result).is_err() {
                        return;
                    }
                    if have_failed {
                        return;
                    }
                }
                Err(e) => {
                    log::info!(
                        "Piece {} download from {} failed: {}. Abandoning peer.",
                        work.index,
                        self.addr,
                        e
                    );
                    let _ = self.work_tx.send(work).await;
                    return;
                }
            }
        }
    }
}
