use std::collections::VecDeque;

use bytes::Bytes;
use tracing::trace;

use crate::error::{MarshalError, Result};
use crate::snapshot::ConnectionSnapshot;
use crate::table::TypeTable;
use crate::tag::END_MARKER;

/// A caller-supplied output buffer and how much of it has been filled.
#[derive(Debug)]
pub struct OutBuf<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> OutBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, written: 0 }
    }

    /// Total capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Bytes still free.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.written
    }

    /// The filled prefix.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.written]
    }

    fn put(&mut self, segment: &[u8]) {
        self.buf[self.written..self.written + segment.len()].copy_from_slice(segment);
        self.written += segment.len();
    }
}

/// Resumable record encoder.
///
/// Records are queued as whole fields. Each call writes as many complete
/// fields as fit in the supplied buffer and keeps the rest pending, so the
/// concatenation of every buffer is the same regardless of buffer sizes.
#[derive(Debug)]
pub struct Marshaller {
    table: TypeTable,
    pending: VecDeque<Bytes>,
    records: usize,
    produced: usize,
    finished: bool,
}

impl Marshaller {
    pub fn new(table: TypeTable) -> Self {
        Self {
            table,
            pending: VecDeque::new(),
            records: 0,
            produced: 0,
            finished: false,
        }
    }

    /// Queue a record and write as much of it as fits.
    ///
    /// Returns `Ok(true)` when the record (and everything queued before it) was
    /// written completely, `Ok(false)` when part of it remains pending.
    pub fn encode(&mut self, snapshot: &ConnectionSnapshot, out: &mut OutBuf<'_>) -> Result<bool> {
        let tag = snapshot.tag();
        if tag.is_reserved() {
            return Err(MarshalError::ReservedType(tag));
        }
        let max = self
            .table
            .max_payload(tag)
            .ok_or(MarshalError::UnknownType(tag))?;
        let size = snapshot.payload().len();
        if size > max {
            return Err(MarshalError::PayloadTooLarge { tag, size, max });
        }

        trace!(
            tag = %tag,
            name = self.table.name(tag),
            size,
            "queue record"
        );
        self.pending.extend(snapshot.segments());
        self.records += 1;
        self.flush(out)
    }

    /// Write pending fields into `out`.
    ///
    /// Returns `Ok(true)` when nothing remains pending.
    pub fn flush(&mut self, out: &mut OutBuf<'_>) -> Result<bool> {
        while let Some(segment) = self.pending.front() {
            if segment.len() > out.remaining() {
                if out.written() == 0 && out.capacity() > 0 {
                    return Err(MarshalError::FieldExceedsBuffer {
                        size: segment.len(),
                        capacity: out.capacity(),
                    });
                }
                return Ok(false);
            }
            out.put(segment);
            self.produced += segment.len();
            self.pending.pop_front();
        }
        Ok(true)
    }

    /// Queue the end-of-stream marker and write as much as fits.
    ///
    /// Calling this more than once queues nothing new.
    pub fn finish(&mut self, out: &mut OutBuf<'_>) -> Result<bool> {
        if !self.finished {
            self.pending.push_back(Bytes::from_static(&END_MARKER));
            self.finished = true;
            trace!(records = self.records, "queue end of stream");
        }
        self.flush(out)
    }

    /// True if fields are waiting for buffer space.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of bytes waiting for buffer space.
    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(Bytes::len).sum()
    }

    /// Number of records queued so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Number of bytes written into caller buffers so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// True once the end-of-stream marker has been queued.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Borrow the type table.
    pub fn table(&self) -> &TypeTable {
        &self.table
    }
}
