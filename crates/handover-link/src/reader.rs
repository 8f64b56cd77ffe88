use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::error::{LinkError, Result};
use crate::frame::{decode_frame, LinkConfig, LinkFrame};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete link frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct LinkReader<T> {
    inner: T,
    buf: BytesMut,
    config: LinkConfig,
}

impl<T: Read> LinkReader<T> {
    /// Create a new link reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LinkConfig::default())
    }

    /// Create a new link reader with explicit configuration.
    pub fn with_config(inner: T, config: LinkConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(LinkError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<LinkFrame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_chunk)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(LinkError::Io(err)),
            };

            if read == 0 {
                return Err(LinkError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// True if bytes of a partial frame are buffered.
    pub fn has_partial_frame(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current link reader configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

#[cfg(unix)]
impl LinkReader<std::os::unix::net::UnixStream> {
    /// Create a link reader for a Unix stream and apply the read timeout from
    /// config.
    pub fn with_config_unix(
        inner: std::os::unix::net::UnixStream,
        config: LinkConfig,
    ) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::frame::{encode_frame, FrameKind, MAGIC};

    fn wire(frames: &[LinkFrame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_sequence() {
        let bytes = wire(&[
            LinkFrame::data(&b"one"[..]),
            LinkFrame::data(&b"two"[..]),
            LinkFrame::end(),
        ]);
        let mut reader = LinkReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"one");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"two");
        assert_eq!(reader.read_frame().unwrap().kind, FrameKind::End);
        assert!(matches!(
            reader.read_frame(),
            Err(LinkError::ConnectionClosed)
        ));
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[LinkFrame::data(&b"slow"[..])]),
            pos: 0,
        };
        let mut reader = LinkReader::new(byte_reader);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"slow");
        assert!(!reader.has_partial_frame());
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u8(0x01);
        partial.put_u16_le(16);
        partial.put_slice(b"only-part");

        let mut reader = LinkReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_frame(),
            Err(LinkError::ConnectionClosed)
        ));
        assert!(reader.has_partial_frame());
    }

    #[test]
    fn chunk_limit_comes_from_config() {
        let bytes = wire(&[LinkFrame::data(vec![1u8; 64])]);
        let config = LinkConfig {
            max_chunk: 32,
            ..LinkConfig::default()
        };
        let mut reader = LinkReader::with_config(Cursor::new(bytes), config);
        assert!(matches!(
            reader.read_frame(),
            Err(LinkError::ChunkTooLarge { size: 64, max: 32 })
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[LinkFrame::abort()])),
        };
        let mut framed = LinkReader::new(reader);
        assert_eq!(framed.read_frame().unwrap().kind, FrameKind::Abort);
    }

    #[test]
    #[cfg(unix)]
    fn applies_read_timeout_for_unix_stream() {
        let (_left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let config = LinkConfig {
            read_timeout: Some(std::time::Duration::from_millis(20)),
            ..LinkConfig::default()
        };
        let mut reader = LinkReader::with_config_unix(right, config).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        ));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
