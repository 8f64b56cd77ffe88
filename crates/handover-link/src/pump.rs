//! Drive a coordinator's stream across a link.

use std::io::{Read, Write};

use bytes::{Buf, BytesMut};
use tracing::{debug, info, warn};

use handover_coordinator::{BdAddr, Coordinator, FailureReason, HandoverAdapter};

use crate::error::{LinkError, Result};
use crate::frame::FrameKind;
use crate::reader::LinkReader;
use crate::writer::LinkWriter;

/// What crossed the link during one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfer {
    /// DATA frames carried.
    pub chunks: usize,
    /// Handover stream bytes carried.
    pub bytes: usize,
}

/// Send the outgoing stream of an attempt already opened with
/// `request_handover`, one DATA frame per `produce_bytes` call, then END.
///
/// If the coordinator fails the attempt is already aborted locally; an ABORT
/// frame tells the peer. A link failure aborts the local attempt.
pub fn send_handover<A, W>(
    coordinator: &mut Coordinator<A>,
    writer: &mut LinkWriter<W>,
) -> Result<Transfer>
where
    A: HandoverAdapter,
    W: Write,
{
    let capacity = writer.config().max_chunk;
    let mut buf = vec![0u8; capacity];
    let mut transfer = Transfer::default();

    loop {
        let produced = match coordinator.produce_bytes(&mut buf) {
            Ok(produced) => produced,
            Err(err) => {
                if let Err(link_err) = writer.send_abort() {
                    warn!(error = %link_err, "could not notify peer of abort");
                }
                return Err(err.into());
            }
        };

        if produced.written > 0 {
            if let Err(err) = writer.send_data(&buf[..produced.written]) {
                coordinator.abort(FailureReason::Aborted);
                return Err(err);
            }
            transfer.chunks += 1;
            transfer.bytes += produced.written;
            debug!(written = produced.written, "sent chunk");
        }

        if produced.done {
            if let Err(err) = writer.send_end() {
                coordinator.abort(FailureReason::Aborted);
                return Err(err);
            }
            info!(chunks = transfer.chunks, bytes = transfer.bytes, "stream sent");
            return Ok(transfer);
        }

        if produced.written == 0 {
            coordinator.abort(FailureReason::Aborted);
            // Best effort; the stall is the error worth reporting.
            let _ = writer.send_abort();
            return Err(LinkError::Stalled { capacity });
        }
    }
}

/// Receive a stream for `handset`, feeding DATA payloads into
/// `consume_bytes` and carrying any partial record into the next call.
///
/// END, or EOF on a frame boundary, ends the stream. On success the attempt
/// is complete and waits for `commit`; on any error it has been aborted.
pub fn receive_handover<A, R>(
    coordinator: &mut Coordinator<A>,
    reader: &mut LinkReader<R>,
    handset: &BdAddr,
) -> Result<Transfer>
where
    A: HandoverAdapter,
    R: Read,
{
    let mut pending = BytesMut::new();
    let mut transfer = Transfer::default();
    let mut done = false;

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(LinkError::ConnectionClosed) if !reader.has_partial_frame() => {
                debug!("link closed by peer");
                return finish(coordinator, &pending, done, transfer);
            }
            Err(err) => {
                coordinator.abort(FailureReason::Aborted);
                return Err(err);
            }
        };

        match frame.kind {
            FrameKind::Data => {
                transfer.chunks += 1;
                transfer.bytes += frame.payload.len();
                pending.extend_from_slice(&frame.payload);
                let consumed = coordinator.consume_bytes(handset, &pending)?;
                pending.advance(consumed.consumed);
                done = consumed.done;
            }
            FrameKind::End => return finish(coordinator, &pending, done, transfer),
            FrameKind::Abort => {
                warn!("peer aborted the handover");
                coordinator.abort(FailureReason::PeerAborted);
                return Err(LinkError::PeerAborted);
            }
        }
    }
}

fn finish<A: HandoverAdapter>(
    coordinator: &mut Coordinator<A>,
    pending: &[u8],
    done: bool,
    transfer: Transfer,
) -> Result<Transfer> {
    if !pending.is_empty() {
        warn!(pending = pending.len(), "stream ended inside a record");
        coordinator.abort(FailureReason::CorruptStream);
        return Err(LinkError::ConnectionClosed);
    }
    if !done {
        coordinator.end_of_stream()?;
    }
    info!(chunks = transfer.chunks, bytes = transfer.bytes, "stream received");
    Ok(transfer)
}
