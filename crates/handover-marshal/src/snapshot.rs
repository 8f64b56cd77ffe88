use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MarshalError, Result};
use crate::table::TypeTable;
use crate::tag::{TypeTag, END_OF_STREAM};

/// Record header: tag (1) + payload length (2) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Size of a Bluetooth device address on the wire.
pub const ADDR_LEN: usize = 6;

/// Serialized state of one live object, owned by the adapter that produced it.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    tag: TypeTag,
    payload: Bytes,
    field_ends: Vec<usize>,
}

impl ConnectionSnapshot {
    /// Start building a snapshot of the given type.
    pub fn builder(tag: TypeTag) -> SnapshotWriter {
        SnapshotWriter {
            tag,
            buf: BytesMut::new(),
            field_ends: Vec::new(),
        }
    }

    /// Wrap an already-encoded payload. The payload is treated as one field.
    pub fn from_payload(tag: TypeTag, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let field_ends = if payload.is_empty() {
            Vec::new()
        } else {
            vec![payload.len()]
        };
        Self {
            tag,
            payload,
            field_ends,
        }
    }

    /// The record type.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The encoded payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The total wire size of this record (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Read the payload back field by field.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            tag: self.tag,
            buf: self.payload.clone(),
        }
    }

    /// Wire segments in order: header, then each payload field.
    pub(crate) fn segments(&self) -> Vec<Bytes> {
        let mut segments = Vec::with_capacity(self.field_ends.len() + 1);
        let mut header = BytesMut::with_capacity(HEADER_SIZE);
        encode_header(self.tag, self.payload.len() as u16, &mut header);
        segments.push(header.freeze());

        let mut start = 0usize;
        for &end in &self.field_ends {
            segments.push(self.payload.slice(start..end));
            start = end;
        }
        segments
    }
}

impl PartialEq for ConnectionSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.payload == other.payload
    }
}

impl Eq for ConnectionSnapshot {}

/// Builds a snapshot payload one field at a time.
///
/// Every `put_*` call ends a field; the marshaller never splits a field across
/// two output buffers.
#[derive(Debug)]
pub struct SnapshotWriter {
    tag: TypeTag,
    buf: BytesMut,
    field_ends: Vec<usize>,
}

impl SnapshotWriter {
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self.end_field()
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self.end_field()
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self.end_field()
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self.end_field()
    }

    pub fn put_addr(&mut self, addr: &[u8; ADDR_LEN]) -> &mut Self {
        self.buf.put_slice(addr);
        self.end_field()
    }

    /// Length-prefixed blob. Blobs longer than `u16::MAX` fail in [`finish`](Self::finish).
    pub fn put_blob(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_u16_le(data.len().min(u16::MAX as usize) as u16);
        self.buf.put_slice(data);
        self.end_field()
    }

    /// Seal the snapshot.
    pub fn finish(&mut self) -> Result<ConnectionSnapshot> {
        let size = self.buf.len();
        if size > u16::MAX as usize {
            return Err(MarshalError::PayloadTooLarge {
                tag: self.tag,
                size,
                max: u16::MAX as usize,
            });
        }
        Ok(ConnectionSnapshot {
            tag: self.tag,
            payload: std::mem::take(&mut self.buf).freeze(),
            field_ends: std::mem::take(&mut self.field_ends),
        })
    }

    fn end_field(&mut self) -> &mut Self {
        self.field_ends.push(self.buf.len());
        self
    }
}

/// Reads snapshot fields in the order they were written.
#[derive(Debug)]
pub struct SnapshotReader {
    tag: TypeTag,
    buf: Bytes,
}

impl SnapshotReader {
    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_bool(&mut self, field: &'static str) -> Result<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.invalid(field, u64::from(other))),
        }
    }

    pub fn get_addr(&mut self) -> Result<[u8; ADDR_LEN]> {
        self.need(ADDR_LEN)?;
        let mut addr = [0u8; ADDR_LEN];
        self.buf.copy_to_slice(&mut addr);
        Ok(addr)
    }

    pub fn get_blob(&mut self) -> Result<Bytes> {
        let len = self.get_u16()? as usize;
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Build an [`MarshalError::InvalidValue`] for this record.
    pub fn invalid(&self, field: &'static str, value: u64) -> MarshalError {
        MarshalError::InvalidValue {
            tag: self.tag,
            field,
            value,
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Ensure every payload byte was consumed.
    pub fn finish(self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(MarshalError::TrailingBytes {
                tag: self.tag,
                remaining: self.buf.len(),
            })
        }
    }

    fn need(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(MarshalError::Truncated {
                tag: self.tag,
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }
}

/// One unit decoded from a marshalled stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record.
    Record(ConnectionSnapshot),
    /// The sender's terminal marker.
    EndOfStream,
}

/// Encode a record header into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬────────────┬────────────────────────┐
/// │ Tag (1B) │ Length     │ Payload                │
/// │          │ (2B LE)    │ (Length bytes, fields) │
/// └──────────┴────────────┴────────────────────────┘
/// ```
pub fn encode_header(tag: TypeTag, payload_len: u16, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_u8(tag.get());
    dst.put_u16_le(payload_len);
}

/// Decode the record at the front of `src`.
///
/// Returns `Ok(None)` if `src` doesn't contain a complete record yet, otherwise
/// the decoded unit and the number of bytes it occupied. Unknown tags are
/// rejected as soon as the first byte is visible.
pub fn decode_snapshot(src: &[u8], table: &TypeTable) -> Result<Option<(Decoded, usize)>> {
    let Some(&raw_tag) = src.first() else {
        return Ok(None);
    };
    let tag = TypeTag::new(raw_tag);

    let max_payload = if tag == END_OF_STREAM {
        0
    } else {
        table
            .max_payload(tag)
            .ok_or(MarshalError::UnknownType(tag))?
    };

    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let payload_len = u16::from_le_bytes([src[1], src[2]]) as usize;

    if tag == END_OF_STREAM {
        if payload_len != 0 {
            return Err(MarshalError::MalformedTerminator(payload_len));
        }
        return Ok(Some((Decoded::EndOfStream, HEADER_SIZE)));
    }

    if payload_len > max_payload {
        return Err(MarshalError::PayloadTooLarge {
            tag,
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    let payload = Bytes::copy_from_slice(&src[HEADER_SIZE..total]);
    Ok(Some((
        Decoded::Record(ConnectionSnapshot::from_payload(tag, payload)),
        total,
    )))
}
