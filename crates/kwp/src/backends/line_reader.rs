//! 📖 The line-reading loop shared by every streaming source.
//!
//! File or S3, the bytes end up behind a `tokio::io::AsyncRead`. This wraps one in
//! a `BufReader`, hands out one `\n`-terminated line per call into a buffer the
//! caller owns, and keeps the progress bar fed.
//!
//! A line is never allowed to grow past `max_line_bytes`. Anything longer is
//! read to its newline and thrown away, and the caller gets an empty buffer with
//! the number of bytes skipped.

use anyhow::{Context, Result};
use memchr::memchr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::backends::CommonSourceConfig;
use crate::progress::ProgressMetrics;

pub(crate) struct LineReader<R> {
    reader: BufReader<R>,
    progress: ProgressMetrics,
    max_line_bytes: usize,
    exhausted: bool,
}

impl<R> std::fmt::Debug for LineReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("progress", &self.progress)
            .field("max_line_bytes", &self.max_line_bytes)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub(crate) fn new(inner: R, common_config: &CommonSourceConfig, progress: ProgressMetrics) -> Self {
        Self {
            reader: BufReader::with_capacity(common_config.read_buffer_bytes.max(1), inner),
            progress,
            max_line_bytes: common_config.max_line_bytes.max(1),
            exhausted: false,
        }
    }

    /// 📄 Clear `buf`, fill it with the next line (terminator included). `0` means the stream is done.
    ///
    /// 📏 An oversized line returns its full byte count with `buf` left empty.
    pub(crate) async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        if self.exhausted {
            return Ok(0);
        }

        let mut bytes_read = 0;
        let mut oversized = false;
        loop {
            let available = self
                .reader
                .fill_buf()
                .await
                .context("💀 The byte stream broke off mid-read. Whatever was after this point, we never saw it.")?;
            if available.is_empty() {
                break;
            }

            let (chunk_len, line_done) = match memchr(b'\n', available) {
                Some(at) => (at + 1, true),
                None => (available.len(), false),
            };
            if !oversized {
                if buf.len() + chunk_len > self.max_line_bytes {
                    // -- 🗑️ past the cap: stop keeping bytes, keep counting them
                    oversized = true;
                    buf.clear();
                } else {
                    buf.extend_from_slice(&available[..chunk_len]);
                }
            }
            self.reader.consume(chunk_len);
            bytes_read += chunk_len;
            if line_done {
                break;
            }
        }

        if bytes_read == 0 {
            self.exhausted = true;
            self.progress.finish();
        } else {
            self.progress.update(bytes_read as u64, 1);
        }
        Ok(bytes_read)
    }
}
