//! The piece downloader: given an established [`PeerSession`] and a single
//! [`PieceWork`] item, drives the block-level request pipeline until the
//! whole piece has arrived.

use tokio::time::timeout;

use crate::{
    error::ProtocolViolation,
    peer::PeerSession,
    piece::{PieceResult, PieceWork},
    wire::Message,
    Conf, Error, Result,
};

/// Mutable state of one in-flight piece download: the output buffer and the
/// request-pipeline bookkeeping (downloaded/requested/backlog), per §3.
struct PieceProgress {
    buf: Vec<u8>,
    /// Bytes copied into `buf` so far.
    downloaded: u32,
    /// Bytes for which a request has already been sent.
    requested: u32,
    /// Outstanding requests sent but not yet answered.
    backlog: usize,
}

impl PieceProgress {
    fn new(len: u32) -> Self {
        Self {
            buf: vec![0u8; len as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }
}

/// Downloads a single piece from `session`, verifying neither its hash nor
/// its availability — the caller is expected to have already checked
/// `session.has_piece(work.index)` and to run [`check_integrity`] on the
/// result.
///
/// The whole operation — including however many request/response rounds it
/// takes — is bounded by `conf.piece_timeout`.
pub(crate) async fn download_piece(
    session: &mut PeerSession,
    work: &PieceWork,
    conf: &Conf,
) -> Result<PieceResult> {
    timeout(conf.piece_timeout, download_piece_inner(session, work, conf))
        .await?
}

async fn download_piece_inner(
    session: &mut PeerSession,
    work: &PieceWork,
    conf: &Conf,
) -> Result<PieceResult> {
    let mut progress = PieceProgress::new(work.len);

    while progress.downloaded < work.len {
        if !session.is_choked() {
            fill_pipeline(session, work, conf, &mut progress).await?;
        }

        let msg = session.read_message().await?;
        handle_message(session, work, &mut progress, msg)?;
    }

    Ok(PieceResult {
        index: work.index,
        buf: progress.buf,
    })
}

/// Issues further block requests while there is room in the backlog and
/// bytes left to request.
async fn fill_pipeline(
    session: &mut PeerSession,
    work: &PieceWork,
    conf: &Conf,
    progress: &mut PieceProgress,
) -> Result<()> {
    while progress.backlog < conf.max_backlog && progress.requested < work.len
    {
        let remaining = work.len - progress.requested;
        let block_size = std::cmp::min(conf.max_block_len, remaining);
        log::debug!(
            "Requesting piece {} block at offset {} ({} bytes)",
            work.index,
            progress.requested,
            block_size
        );
        session
            .send_request(work.index, progress.requested, block_size)
            .await?;
        progress.backlog += 1;
        progress.requested += block_size;
    }
    Ok(())
}

/// Dispatches one received message against the piece's progress and the
/// session's choke/bitfield state, per the control loop of §4.4.
fn handle_message(
    session: &mut PeerSession,
    work: &PieceWork,
    progress: &mut PieceProgress,
    msg: Message,
) -> Result<()> {
    match msg {
        Message::KeepAlive => {}
        Message::Unchoke => session.set_choked(false),
        Message::Choke => session.set_choked(true),
        Message::Have { index } => session.mark_have(index)?,
        Message::Piece {
            piece_index,
            offset,
            data,
        } => {
            validate_and_copy(work, progress, piece_index, offset, &data)?;
        }
        // Interested/NotInterested/Bitfield/Request/Cancel/Unknown are all
        // irrelevant to a leech's download pipeline.
        _ => {}
    }
    Ok(())
}

fn validate_and_copy(
    work: &PieceWork,
    progress: &mut PieceProgress,
    piece_index: crate::PieceIndex,
    offset: u32,
    data: &[u8],
) -> Result<()> {
    if piece_index != work.index {
        return Err(ProtocolViolation::PieceIndexMismatch {
            expected: work.index,
            got: piece_index,
        }
        .into());
    }
    if offset >= work.len {
        return Err(ProtocolViolation::BeginOutOfRange {
            begin: offset,
            piece_len: work.len,
        }
        .into());
    }
    let end = offset as u64 + data.len() as u64;
    if end > work.len as u64 {
        return Err(ProtocolViolation::BlockOutOfRange {
            begin: offset,
            block_len: data.len() as u32,
            piece_len: work.len,
        }
        .into());
    }

    let begin = offset as usize;
    progress.buf[begin..begin + data.len()].copy_from_slice(data);
    progress.downloaded += data.len() as u32;
    progress.backlog = progress.backlog.saturating_sub(1);

    Ok(())
}

/// Verifies that `buf`'s SHA-1 digest matches `hash`.
pub(crate) fn check_integrity(
    index: crate::PieceIndex,
    hash: &crate::Sha1Hash,
    buf: &[u8],
) -> Result<()> {
    use sha1::{Digest, Sha1};

    let digest = Sha1::digest(buf);
    if digest.as_slice() != hash {
        return Err(Error::Integrity { index });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(index: usize, len: u32) -> PieceWork {
        PieceWork {
            index,
            hash: [0u8; 20],
            len,
        }
    }

    #[test]
    fn test_validate_and_copy_places_block_at_begin() {
        let w = work(0, 8);
        let mut progress = PieceProgress::new(w.len);
        validate_and_copy(&w, &mut progress, 0, 0, b"ABCDEFGH").unwrap();
        assert_eq!(progress.buf, b"ABCDEFGH");
        assert_eq!(progress.downloaded, 8);
    }

    #[test]
    fn test_validate_and_copy_rejects_index_mismatch() {
        let w = work(0, 8);
        let mut progress = PieceProgress::new(w.len);
        let err = validate_and_copy(&w, &mut progress, 1, 0, b"ABCDEFGH");
        assert!(matches!(
            err,
            Err(Error::Protocol(ProtocolViolation::PieceIndexMismatch {
                ..
            }))
        ));
    }

    #[test]
    fn test_validate_and_copy_rejects_begin_out_of_range() {
        let w = work(0, 8);
        let mut progress = PieceProgress::new(w.len);
        let err = validate_and_copy(&w, &mut progress, 0, 8, b"A");
        assert!(matches!(
            err,
            Err(Error::Protocol(ProtocolViolation::BeginOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_validate_and_copy_rejects_block_overrun() {
        let w = work(0, 8);
        let mut progress = PieceProgress::new(w.len);
        let err = validate_and_copy(&w, &mut progress, 0, 4, b"ABCDE");
        assert!(matches!(
            err,
            Err(Error::Protocol(ProtocolViolation::BlockOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_validate_and_copy_too_short_payload_is_caught_by_codec() {
        // The < 8 byte case is rejected during message decoding, not here;
        // this just documents that boundary.
    }

    #[test]
    fn test_check_integrity_rejects_wrong_hash() {
        use sha1::{Digest, Sha1};
        let buf = b"ABCDEFGH".to_vec();
        let mut wrong = Sha1::digest(&buf);
        wrong[0] ^= 0xff;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&wrong);
        assert!(check_integrity(0, &hash, &buf).is_err());
    }

    #[test]
    fn test_check_integrity_accepts_correct_hash() {
        use sha1::{Digest, Sha1};
        let buf = b"ABCDEFGH".to_vec();
        let digest = Sha1::digest(&buf);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        assert!(check_integrity(0, &hash, &buf).is_ok());
    }
}
