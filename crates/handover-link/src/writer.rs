use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::{LinkError, Result};
use crate::frame::{encode_frame, LinkConfig, LinkFrame};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete link frames to any `Write` stream.
pub struct LinkWriter<T> {
    inner: T,
    buf: BytesMut,
    config: LinkConfig,
}

impl<T: Write> LinkWriter<T> {
    /// Create a new link writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LinkConfig::default())
    }

    /// Create a new link writer with explicit configuration.
    pub fn with_config(inner: T, config: LinkConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &LinkFrame) -> Result<()> {
        if frame.payload.len() > self.config.max_chunk {
            return Err(LinkError::ChunkTooLarge {
                size: frame.payload.len(),
                max: self.config.max_chunk,
            });
        }

        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(LinkError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }

        self.flush()
    }

    /// Send a chunk of handover stream.
    pub fn send_data(&mut self, chunk: &[u8]) -> Result<()> {
        self.write_frame(&LinkFrame::data(bytes::Bytes::copy_from_slice(chunk)))
    }

    pub fn send_end(&mut self) -> Result<()> {
        self.write_frame(&LinkFrame::end())
    }

    pub fn send_abort(&mut self) -> Result<()> {
        self.write_frame(&LinkFrame::abort())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
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

    /// Current link writer configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

#[cfg(unix)]
impl LinkWriter<std::os::unix::net::UnixStream> {
    /// Create a link writer for a Unix stream and apply the write timeout from
    /// config.
    pub fn with_config_unix(
        inner: std::os::unix::net::UnixStream,
        config: LinkConfig,
    ) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameKind, HEADER_SIZE};
    use crate::reader::LinkReader;

    #[test]
    fn writes_whole_frames() {
        let mut writer = LinkWriter::new(Vec::new());
        writer.send_data(b"abc").unwrap();
        writer.send_end().unwrap();
        assert_eq!(writer.get_ref().len(), 2 * HEADER_SIZE + 3);
        assert_eq!(&writer.get_ref()[..HEADER_SIZE], b"HO\x01\x03\x00");
    }

    #[test]
    fn rejects_chunks_over_the_limit() {
        let config = LinkConfig {
            max_chunk: 4,
            ..LinkConfig::default()
        };
        let mut writer = LinkWriter::with_config(Vec::new(), config);
        assert!(matches!(
            writer.send_data(b"too long"),
            Err(LinkError::ChunkTooLarge { size: 8, max: 4 })
        ));
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = LinkWriter::new(OneByteWriter {
            written: Vec::new(),
            interrupt_next: true,
        });
        writer.send_data(b"resume").unwrap();
        assert_eq!(writer.get_ref().written.len(), HEADER_SIZE + 6);
    }

    #[test]
    fn closed_sink_is_reported() {
        let mut sink = [0u8; 2];
        let mut writer = LinkWriter::new(&mut sink[..]);
        assert!(matches!(
            writer.send_abort(),
            Err(LinkError::ConnectionClosed)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = LinkWriter::with_config_unix(left, LinkConfig::default()).unwrap();
        let mut reader = LinkReader::with_config_unix(right, LinkConfig::default()).unwrap();

        writer.send_data(b"ping").unwrap();
        writer.send_abort().unwrap();
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"ping");
        assert_eq!(reader.read_frame().unwrap().kind, FrameKind::Abort);
    }

    struct OneByteWriter {
        written: Vec<u8>,
        interrupt_next: bool,
    }

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            match buf.first() {
                Some(byte) => {
                    self.written.push(*byte);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
