//! Line framing over byte streams
//!
//! [`FrameBuffer`] is the pure part: it accumulates raw bytes and yields
//! complete lines, carrying any trailing partial line over to the next
//! read. [`FrameReader`] drives it from an async reader.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Frame;

/// Longest partial line kept while waiting for its newline
pub const MAX_FRAME_BYTES: usize = 4096;

const READ_CHUNK_BYTES: usize = 1024;

// ─────────────────────────────────────────────────────────────────
// Frame Buffer
// ─────────────────────────────────────────────────────────────────

/// Splits a byte stream into newline-terminated frames
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete line, without its `\n`.
    ///
    /// A partial line longer than [`MAX_FRAME_BYTES`] is discarded and
    /// surfaced as an empty line so the caller sees it as unparseable.
    pub fn next_line(&mut self) -> Option<String> {
        match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..pos]);
                Some(text.trim_end_matches('\r').to_string())
            }
            None if self.pending.len() > MAX_FRAME_BYTES => {
                self.pending.clear();
                Some(String::new())
            }
            None => None,
        }
    }

    /// Take and decode the next complete frame
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.next_line().map(|line| Frame::parse(&line))
    }

    /// Bytes held back waiting for a newline
    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ─────────────────────────────────────────────────────────────────
// Async reader / writer
// ─────────────────────────────────────────────────────────────────

/// Reads frames one at a time from an async byte stream.
///
/// `next_frame` is cancel-safe: bytes already read stay buffered.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(),
        }
    }

    /// Next frame, or `None` once the peer has closed the stream
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(Some(frame));
            }
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend(&chunk[..n]);
        }
    }

    /// Next raw line, for consumers that only render text
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(Some(line));
            }
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend(&chunk[..n]);
        }
    }
}

/// Write one frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    write_line(writer, &frame.encode()).await
}

/// Write an already encoded line (newline included) and flush it
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    #[test]
    fn test_buffer_splits_lines() {
        let mut buf = FrameBuffer::new();
        buf.extend(b"check 1 0\nqueue 1\n");
        assert_eq!(buf.next_line().as_deref(), Some("check 1 0"));
        assert_eq!(buf.next_line().as_deref(), Some("queue 1"));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_buffer_keeps_partial_frame() {
        let mut buf = FrameBuffer::new();
        buf.extend(b"reviewed 1 ");
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.pending_len(), 11);

        buf.extend(b"0 1\nque");
        assert_eq!(
            buf.next_frame(),
            Some(Frame::ReviewResult {
                to: Identity::new(1),
                from: Identity::new(0),
                verdict: crate::types::Verdict::Pass,
            })
        );
        assert_eq!(buf.next_frame(), None);

        buf.extend(b"ue 2\n");
        assert_eq!(buf.next_frame(), Some(Frame::QueuePoll(Identity::new(2))));
    }

    #[test]
    fn test_buffer_empty_line_is_unknown() {
        let mut buf = FrameBuffer::new();
        buf.extend(b"\n\r\n");
        assert_eq!(buf.next_frame(), Some(Frame::Unknown(String::new())));
        assert_eq!(buf.next_frame(), Some(Frame::Unknown(String::new())));
    }

    #[test]
    fn test_buffer_discards_oversized_partial() {
        let mut buf = FrameBuffer::new();
        buf.extend(&vec![b'x'; MAX_FRAME_BYTES + 1]);
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert_eq!(buf.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_reads() {
        let stream = tokio_test::io::Builder::new()
            .read(b"che")
            .read(b"ck 1 0\nqueue")
            .read(b" 1\n")
            .build();
        let mut reader = FrameReader::new(stream);

        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some(Frame::CheckRequest { to: Identity::new(1), from: Identity::new(0) })
        );
        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some(Frame::QueuePoll(Identity::new(1)))
        );
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_drops_trailing_partial_at_eof() {
        let stream = tokio_test::io::Builder::new().read(b"start 0\nstart").build();
        let mut reader = FrameReader::new(stream);

        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Start(Identity::new(0))));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut stream = tokio_test::io::Builder::new().write(b"queue -1 2\n").build();
        let frame = Frame::QueueAnswer { from: None, identity: Identity::new(2) };
        write_frame(&mut stream, &frame).await.unwrap();
    }
}
