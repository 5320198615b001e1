//! Message framing for the wire protocol.
//!
//! A framed message is a sequence of frames, each a 4-byte big-endian length
//! followed by that many bytes, closed by a single zero-length frame. The
//! payload is the concatenation of the non-empty frame bodies.

use crate::error::FramingError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Frame header size (4 bytes length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default chunk size used when splitting a payload into frames.
pub const DEFAULT_FRAME_SIZE: usize = 8 * 1024;

/// Maximum reassembled message size (10MB by default).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for reading and writing framed messages.
#[derive(Debug, Clone)]
pub struct FramingConfig {
    /// Largest frame body written; payloads are chunked at this size.
    pub frame_size: usize,
    /// Largest reassembled payload accepted when reading.
    pub max_message_size: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Codec for whole framed messages.
///
/// Decoding yields one payload per terminating empty frame. Partial payload
/// state is dropped as soon as a message completes or fails.
#[derive(Debug, Default)]
pub struct FramedMessageCodec {
    config: FramingConfig,
    pending: BytesMut,
}

impl FramedMessageCodec {
    /// Create a new codec with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with the given configuration.
    #[must_use]
    pub fn with_config(config: FramingConfig) -> Self {
        Self {
            config,
            pending: BytesMut::new(),
        }
    }

    /// Create a codec with a custom frame chunk size.
    #[must_use]
    pub const fn with_frame_size(mut self, size: usize) -> Self {
        self.config.frame_size = size;
        self
    }

    /// Create a codec with a custom maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }
}

impl Decoder for FramedMessageCodec {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if buf.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }

            // Parse header without consuming
            let mut header = &buf[..FRAME_HEADER_SIZE];
            let frame_len = header.get_u32() as usize;

            if frame_len == 0 {
                buf.advance(FRAME_HEADER_SIZE);
                return Ok(Some(self.pending.split().freeze()));
            }

            let size = self.pending.len() + frame_len;
            if size > self.config.max_message_size {
                self.pending.clear();
                return Err(FramingError::MessageTooLarge {
                    size,
                    max: self.config.max_message_size,
                });
            }

            let total = FRAME_HEADER_SIZE + frame_len;
            if buf.len() < total {
                buf.reserve(total - buf.len());
                return Ok(None);
            }

            buf.advance(FRAME_HEADER_SIZE);
            self.pending.extend_from_slice(&buf.split_to(frame_len));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        if buf.is_empty() && self.pending.is_empty() {
            Ok(None)
        } else {
            self.pending.clear();
            Err(FramingError::ConnectionClosed)
        }
    }
}

impl Encoder<Bytes> for FramedMessageCodec {
    type Error = FramingError;

    fn encode(&mut self, payload: Bytes, buf: &mut BytesMut) -> Result<(), Self::Error> {
        write_frames(&payload, self.config.frame_size, buf);
        Ok(())
    }
}

/// Append `payload` to `buf` as frames followed by the empty terminator.
fn write_frames(payload: &[u8], frame_size: usize, buf: &mut BytesMut) {
    let frame_size = frame_size.max(1);
    let frames = payload.len().div_ceil(frame_size);
    buf.reserve(payload.len() + (frames + 1) * FRAME_HEADER_SIZE);

    for chunk in payload.chunks(frame_size) {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(chunk.len() as u32);
        buf.put_slice(chunk);
    }
    buf.put_u32(0);
}

/// Frame a payload into a standalone buffer.
#[must_use]
pub fn encode_framed(payload: &[u8], config: &FramingConfig) -> Bytes {
    let mut buf = BytesMut::new();
    write_frames(payload, config.frame_size, &mut buf);
    buf.freeze()
}

/// Read the first framed message out of `data`.
///
/// Bytes after the terminating frame are ignored.
///
/// # Errors
///
/// Returns [`FramingError::ConnectionClosed`] if `data` ends before the
/// terminating frame.
pub fn decode_framed(data: &[u8], config: &FramingConfig) -> Result<Bytes, FramingError> {
    let mut codec = FramedMessageCodec::with_config(config.clone());
    let mut buf = BytesMut::from(data);
    codec
        .decode(&mut buf)?
        .ok_or(FramingError::ConnectionClosed)
}

/// Read one framed message from an async byte stream.
///
/// # Errors
///
/// Returns [`FramingError::ConnectionClosed`] if the stream is exhausted
/// before the terminating frame, including when it is empty.
pub async fn read_framed_message<R>(
    reader: &mut R,
    config: &FramingConfig,
) -> Result<Bytes, FramingError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut message = BytesMut::new();
    loop {
        let frame_len = reader.read_u32().await.map_err(closed_on_eof)? as usize;
        if frame_len == 0 {
            return Ok(message.freeze());
        }

        let size = message.len() + frame_len;
        if size > config.max_message_size {
            return Err(FramingError::MessageTooLarge {
                size,
                max: config.max_message_size,
            });
        }

        let start = message.len();
        message.resize(size, 0);
        reader
            .read_exact(&mut message[start..])
            .await
            .map_err(closed_on_eof)?;
    }
}

/// Write one framed message to an async byte stream and flush it.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub async fn write_framed_message<W>(
    writer: &mut W,
    payload: &[u8],
    config: &FramingConfig,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let framed = encode_framed(payload, config);
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

fn closed_on_eof(err: io::Error) -> FramingError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_frames() -> FramingConfig {
        FramingConfig {
            frame_size: 4,
            ..FramingConfig::default()
        }
    }

    #[test]
    fn test_chunking_layout() {
        let framed = encode_framed(b"abcdefghij", &small_frames());

        let mut expected = BytesMut::new();
        expected.put_u32(4);
        expected.put_slice(b"abcd");
        expected.put_u32(4);
        expected.put_slice(b"efgh");
        expected.put_u32(2);
        expected.put_slice(b"ij");
        expected.put_u32(0);

        assert_eq!(framed, expected.freeze());
    }

    #[test]
    fn test_empty_payload_is_terminator_only() {
        let framed = encode_framed(b"", &FramingConfig::default());
        assert_eq!(&framed[..], &[0, 0, 0, 0]);

        let decoded = decode_framed(&framed, &FramingConfig::default()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_empty_stream_is_closed() {
        let result = decode_framed(b"", &FramingConfig::default());
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FramedMessageCodec::new();
        let mut buf = BytesMut::new();

        buf.put_u32(100);
        buf.put_slice(b"short");

        // Needs more data
        assert!(codec.decode(&mut buf).unwrap().is_none());
        // And at EOF that is a closed connection
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_codec_decodes_consecutive_messages() {
        let mut codec = FramedMessageCodec::new().with_frame_size(3);
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"first"), &mut buf).unwrap();
        codec.encode(Bytes::from_static(b"second"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "second");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_message_too_large() {
        let config = FramingConfig {
            frame_size: 4,
            max_message_size: 6,
        };
        let framed = encode_framed(b"abcdefgh", &config);

        assert!(matches!(
            decode_framed(&framed, &config),
            Err(FramingError::MessageTooLarge { size: 8, max: 6 })
        ));
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let config = small_frames();
        let mut out = Vec::new();
        write_framed_message(&mut out, b"hello framed world", &config)
            .await
            .unwrap();

        let mut reader = &out[..];
        let payload = read_framed_message(&mut reader, &config).await.unwrap();
        assert_eq!(payload, "hello framed world");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_async_missing_terminator() {
        let framed = encode_framed(b"payload", &FramingConfig::default());
        let truncated = &framed[..framed.len() - FRAME_HEADER_SIZE];

        let mut reader = truncated;
        let result = read_framed_message(&mut reader, &FramingConfig::default()).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }
}
