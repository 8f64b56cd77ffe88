use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{LinkError, Result};

/// Frame header: magic (2) + kind (1) + length (2) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Magic bytes: "HO" (0x48 0x4f).
pub const MAGIC: [u8; 2] = *b"HO";

/// Default largest chunk of handover stream carried in one frame.
pub const DEFAULT_MAX_CHUNK: usize = 256;

/// What a link frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A chunk of the handover byte stream.
    Data,
    /// The sender has produced the whole stream.
    End,
    /// The sender abandoned the attempt.
    Abort,
}

impl FrameKind {
    fn to_wire(self) -> u8 {
        match self {
            FrameKind::Data => 0x01,
            FrameKind::End => 0x02,
            FrameKind::Abort => 0x03,
        }
    }

    fn from_wire(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FrameKind::Data),
            0x02 => Ok(FrameKind::End),
            0x03 => Ok(FrameKind::Abort),
            other => Err(LinkError::UnknownKind(other)),
        }
    }
}

/// One frame on the earbud-to-earbud link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl LinkFrame {
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Data,
            payload: payload.into(),
        }
    }

    pub fn end() -> Self {
        Self {
            kind: FrameKind::End,
            payload: Bytes::new(),
        }
    }

    pub fn abort() -> Self {
        Self {
            kind: FrameKind::Abort,
            payload: Bytes::new(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Kind     │ Length   │ Payload         │
/// │ 0x48 0x4f    │ (1B)     │ (2B LE)  │ (Length bytes)  │
/// │ "HO"         │          │          │                 │
/// └──────────────┴──────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(frame: &LinkFrame, dst: &mut BytesMut) -> Result<()> {
    let len = frame.payload.len();
    if len > u16::MAX as usize {
        return Err(LinkError::ChunkTooLarge {
            size: len,
            max: u16::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + len);
    dst.put_slice(&MAGIC);
    dst.put_u8(frame.kind.to_wire());
    dst.put_u16_le(len as u16);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_chunk: usize) -> Result<Option<LinkFrame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(LinkError::InvalidMagic);
    }
    let kind = FrameKind::from_wire(src[2])?;
    let len = u16::from_le_bytes([src[3], src[4]]) as usize;

    if len > max_chunk {
        return Err(LinkError::ChunkTooLarge {
            size: len,
            max: max_chunk,
        });
    }

    let total = HEADER_SIZE + len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(len).freeze();
    Ok(Some(LinkFrame { kind, payload }))
}

/// Configuration for the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Largest chunk carried per frame; also the buffer handed to the
    /// coordinator on the sending side. Default: 256 bytes.
    pub max_chunk: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_chunk: DEFAULT_MAX_CHUNK,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode() {
        let mut buf = BytesMut::new();
        encode_frame(&LinkFrame::data(&b"\x01\x0a\x00"[..]), &mut buf).unwrap();
        encode_frame(&LinkFrame::end(), &mut buf).unwrap();
        assert_eq!(&buf[..HEADER_SIZE], b"HO\x01\x03\x00");

        let data = decode_frame(&mut buf, DEFAULT_MAX_CHUNK).unwrap().unwrap();
        assert_eq!(data.kind, FrameKind::Data);
        assert_eq!(data.payload.as_ref(), b"\x01\x0a\x00");
        let end = decode_frame(&mut buf, DEFAULT_MAX_CHUNK).unwrap().unwrap();
        assert_eq!(end, LinkFrame::end());
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_frames_need_more_data() {
        let mut buf = BytesMut::from(&b"HO\x01"[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_CHUNK).unwrap().is_none());

        let mut buf = BytesMut::new();
        encode_frame(&LinkFrame::data(vec![7u8; 10]), &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 4);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_CHUNK).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 4);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut buf = BytesMut::from(&b"IP\x01\x00\x00"[..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_CHUNK),
            Err(LinkError::InvalidMagic)
        ));

        let mut buf = BytesMut::from(&b"HO\x09\x00\x00"[..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_CHUNK),
            Err(LinkError::UnknownKind(0x09))
        ));

        let mut buf = BytesMut::from(&b"HO\x01\x01\x01"[..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_CHUNK),
            Err(LinkError::ChunkTooLarge { size: 257, max: 256 })
        ));
    }

    #[test]
    fn oversized_payload_cannot_be_encoded() {
        let mut buf = BytesMut::new();
        let frame = LinkFrame::data(vec![0u8; u16::MAX as usize + 1]);
        assert!(matches!(
            encode_frame(&frame, &mut buf),
            Err(LinkError::ChunkTooLarge { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn wire_size() {
        assert_eq!(LinkFrame::data(vec![0u8; 4]).wire_size(), HEADER_SIZE + 4);
        assert_eq!(LinkFrame::abort().wire_size(), HEADER_SIZE);
    }
}
