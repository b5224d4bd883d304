//! The audio-source contract for playback.

use crate::constants::OPUS_FRAME_SIZE;
use std::io::{Cursor, ErrorKind, Result as IoResult};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A stream of pre-encoded Opus audio.
///
/// Each read of [`OPUS_FRAME_SIZE`] bytes must yield exactly one 20 ms
/// Opus frame; a short read marks the end of the stream. Encoding,
/// resampling, and framing are the producer's concern.
///
/// Dropping the stream (on stop or source switch) releases the upstream
/// producer, letting it drain or abort as it sees fit.
pub struct OpusStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl OpusStream {
    /// Wraps any async byte source honouring the framing contract above.
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    /// Reads one frame into `frame`, returning `false` on end of stream.
    ///
    /// `frame` must be exactly [`OPUS_FRAME_SIZE`] bytes.
    pub(crate) async fn read_frame(&mut self, frame: &mut [u8]) -> IoResult<bool> {
        debug_assert_eq!(frame.len(), OPUS_FRAME_SIZE);

        match self.reader.read_exact(frame).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl From<Vec<u8>> for OpusStream {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(Cursor::new(bytes))
    }
}

impl std::fmt::Debug for OpusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn yields_whole_frames_then_ends() {
        let mut source = OpusStream::from(vec![0x55u8; OPUS_FRAME_SIZE * 2]);
        let mut frame = [0u8; OPUS_FRAME_SIZE];

        assert!(source.read_frame(&mut frame).await.unwrap());
        assert!(source.read_frame(&mut frame).await.unwrap());
        assert_eq!(frame, [0x55u8; OPUS_FRAME_SIZE]);
        assert!(!source.read_frame(&mut frame).await.unwrap());
    }

    #[tokio::test]
    async fn short_tail_is_end_of_stream() {
        let mut source = OpusStream::from(vec![0u8; OPUS_FRAME_SIZE + 10]);
        let mut frame = [0u8; OPUS_FRAME_SIZE];

        assert!(source.read_frame(&mut frame).await.unwrap());
        assert!(!source.read_frame(&mut frame).await.unwrap());
    }
}
