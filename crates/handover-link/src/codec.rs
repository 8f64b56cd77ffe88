//! `tokio_util` codec for the link framing.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{LinkError, Result};
use crate::frame::{decode_frame, encode_frame, LinkConfig, LinkFrame};

/// Frames and unframes [`LinkFrame`]s on an async byte stream.
#[derive(Debug, Clone, Default)]
pub struct LinkCodec {
    config: LinkConfig,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

impl Decoder for LinkCodec {
    type Item = LinkFrame;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LinkFrame>> {
        decode_frame(src, self.config.max_chunk)
    }
}

impl Encoder<LinkFrame> for LinkCodec {
    type Error = LinkError;

    fn encode(&mut self, frame: LinkFrame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.config.max_chunk {
            return Err(LinkError::ChunkTooLarge {
                size: frame.payload.len(),
                max: self.config.max_chunk,
            });
        }
        encode_frame(&frame, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::frame::FrameKind;

    #[tokio::test]
    async fn frames_cross_a_duplex_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, LinkCodec::new());
        let mut stream = FramedRead::new(server, LinkCodec::new());

        sink.send(LinkFrame::data(vec![0x01, 0x0c, 0x00])).await.unwrap();
        sink.send(LinkFrame::end()).await.unwrap();
        drop(sink);

        let data = stream.next().await.unwrap().unwrap();
        assert_eq!(data.payload.as_ref(), &[0x01, 0x0c, 0x00]);
        assert_eq!(stream.next().await.unwrap().unwrap().kind, FrameKind::End);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn encoder_enforces_chunk_limit() {
        let mut codec = LinkCodec::with_config(LinkConfig {
            max_chunk: 2,
            ..LinkConfig::default()
        });
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(LinkFrame::data(vec![0u8; 3]), &mut dst),
            Err(LinkError::ChunkTooLarge { size: 3, max: 2 })
        ));
        assert!(codec.decode(&mut dst).unwrap().is_none());
    }
}
