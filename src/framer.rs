//! Newline framing over an async byte stream.
//!
//! The serial device delivers bytes in arbitrary chunks. [`LineFramer`]
//! accumulates them in a [`BytesMut`] buffer and hands out one line per
//! newline, with the delimiter (and a trailing carriage return) removed.
//!
//! `next_line` is cancel-safe: bytes already read stay in the internal buffer
//! if the future is dropped, so it can be used as a `tokio::select!` branch.

use crate::error::{AppResult, IngestError};
use bytes::BytesMut;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest line accepted before the stream is considered broken.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Forward-only sequence of text lines read from `R`.
pub struct LineFramer<R> {
    reader: R,
    buf: BytesMut,
    /// Bytes at the front of `buf` already known to contain no newline.
    scanned: usize,
    max_line_len: usize,
    eof: bool,
    lines_read: u64,
}

impl<R> LineFramer<R>
where
    R: AsyncRead + Unpin,
{
    /// Frame `reader` with the default line length limit.
    pub fn new(reader: R) -> Self {
        Self::with_max_line_len(reader, DEFAULT_MAX_LINE_LEN)
    }

    /// Frame `reader`, failing on any line longer than `max_line_len` bytes.
    ///
    /// The limit applies to the line as handed out, without its `\r\n`.
    pub fn with_max_line_len(reader: R, max_line_len: usize) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
            max_line_len,
            eof: false,
            lines_read: 0,
        }
    }

    /// Number of lines produced so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Read the next line.
    ///
    /// Returns `Ok(None)` once the stream has closed and every buffered byte
    /// has been handed out. An unterminated fragment left at end of stream is
    /// returned as a final line. Read failures are returned as
    /// [`IngestError::Stream`].
    pub async fn next_line(&mut self) -> AppResult<Option<String>> {
        loop {
            if let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
                let end = self.scanned + offset;
                if content_len(&self.buf[..end]) > self.max_line_len {
                    return Err(IngestError::LineTooLong {
                        limit: self.max_line_len,
                    });
                }
                let mut line = self.buf.split_to(end + 1);
                line.truncate(end);
                self.scanned = 0;
                return Ok(Some(self.finish(line)));
            }
            self.scanned = self.buf.len();

            if content_len(&self.buf) > self.max_line_len {
                return Err(IngestError::LineTooLong {
                    limit: self.max_line_len,
                });
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = self.buf.split();
                self.scanned = 0;
                return Ok(Some(self.finish(rest)));
            }

            if self.buf.capacity() == self.buf.len() {
                self.buf.reserve(READ_CHUNK);
            }
            let read = self
                .reader
                .read_buf(&mut self.buf)
                .await
                .map_err(IngestError::Stream)?;
            if read == 0 {
                self.eof = true;
            }
        }
    }

    /// Turn the framer into a [`Stream`] of lines.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = AppResult<String>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut framer = state?;
            match framer.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(framer))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn finish(&mut self, mut line: BytesMut) -> String {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        self.lines_read += 1;
        match String::from_utf8(line.to_vec()) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}

/// Length of a pending line once a trailing `\r` is stripped.
fn content_len(bytes: &[u8]) -> usize {
    match bytes.last() {
        Some(b'\r') => bytes.len() - 1,
        _ => bytes.len(),
    }
}
