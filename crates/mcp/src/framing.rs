//! Newline framing with a size cap.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// One read from a [`LineReader`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete line, trailing newline included if present.
    Line(Vec<u8>),
    /// A line longer than the cap; its bytes were discarded.
    TooLarge(usize),
    Eof,
}

/// Reads newline-terminated messages of at most `max` bytes.
///
/// Bytes read before a cancelled call stay buffered, so wrapping
/// [`next_frame`](Self::next_frame) in a timeout never splits a message.
pub(crate) struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    max: usize,
    /// Bytes of an oversized line seen so far, while skipping to its end.
    overflow: Option<usize>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R, max: usize) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            max,
            overflow: None,
        }
    }

    pub(crate) async fn next_frame(&mut self) -> std::io::Result<Frame> {
        loop {
            if let Some(seen) = self.overflow {
                self.buf.clear();
                let n = (&mut self.reader)
                    .take(self.max as u64)
                    .read_until(b'\n', &mut self.buf)
                    .await?;
                let seen = seen + n;
                if n == 0 || self.buf.last() == Some(&b'\n') {
                    self.overflow = None;
                    self.buf.clear();
                    return Ok(Frame::TooLarge(seen));
                }
                self.overflow = Some(seen);
                continue;
            }

            let room = (self.max + 1).saturating_sub(self.buf.len()) as u64;
            let n = (&mut self.reader)
                .take(room)
                .read_until(b'\n', &mut self.buf)
                .await?;

            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(Frame::Eof);
                }
                // Unterminated last line.
                return Ok(Frame::Line(std::mem::take(&mut self.buf)));
            }
            if self.buf.last() == Some(&b'\n') {
                return Ok(Frame::Line(std::mem::take(&mut self.buf)));
            }
            if self.buf.len() > self.max {
                self.overflow = Some(self.buf.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn reader(bytes: &'static [u8], max: usize) -> LineReader<&'static [u8]> {
        LineReader::new(bytes, max)
    }

    #[tokio::test]
    async fn splits_on_newlines() {
        let mut lines = reader(b"one\ntwo\nthree", 16);
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Line(b"one\n".to_vec()));
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Line(b"two\n".to_vec()));
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Line(b"three".to_vec()));
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn line_at_the_cap_is_accepted() {
        let mut lines = reader(b"abcd\nef\n", 4);
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Line(b"abcd\n".to_vec()));
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Line(b"ef\n".to_vec()));
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_whole() {
        let mut lines = reader(b"0123456789abcdef\nok\n", 4);
        assert_eq!(lines.next_frame().await.unwrap(), Frame::TooLarge(17));
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Line(b"ok\n".to_vec()));
        assert_eq!(lines.next_frame().await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn bytes_survive_a_cancelled_read() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut lines = LineReader::new(tokio::io::BufReader::new(rx), 64);
        tx.write_all(b"{\"half\":").await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), lines.next_frame()).await;
        assert!(timed_out.is_err());

        tx.write_all(b"1}\n").await.unwrap();
        assert_eq!(
            lines.next_frame().await.unwrap(),
            Frame::Line(b"{\"half\":1}\n".to_vec())
        );
    }
}
