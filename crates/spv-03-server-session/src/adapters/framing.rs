//! # Line Framing
//!
//! One JSON object per `\n`-terminated line, with a hard cap on line length so
//! a hostile server cannot make the client buffer without bound.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Framing failures.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Line exceeded the configured limit.
    #[error("line exceeds {limit} bytes")]
    TooLong {
        /// Configured limit.
        limit: usize,
    },
    /// Socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one line into `buf` (newline excluded).
///
/// Returns `Ok(false)` on a clean end of stream. A final line without a
/// terminating newline is treated as end of stream.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> Result<bool, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(true);
    }

    if buf.len() > limit {
        return Err(FrameError::TooLong { limit });
    }
    Ok(false)
}

/// Write one line and flush.
pub async fn write_frame<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_lines() {
        let data: &[u8] = b"{\"a\":1}\n{\"b\":2}\r\n";
        let mut reader = BufReader::new(data);
        let mut buf = Vec::new();

        assert!(read_frame(&mut reader, &mut buf, 64).await.unwrap());
        assert_eq!(buf, b"{\"a\":1}");
        assert!(read_frame(&mut reader, &mut buf, 64).await.unwrap());
        assert_eq!(buf, b"{\"b\":2}");
        assert!(!read_frame(&mut reader, &mut buf, 64).await.unwrap());
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let data = vec![b'x'; 100];
        let mut reader = BufReader::new(data.as_slice());
        let mut buf = Vec::new();
        assert!(matches!(
            read_frame(&mut reader, &mut buf, 10).await,
            Err(FrameError::TooLong { limit: 10 })
        ));
    }

    #[tokio::test]
    async fn test_line_at_limit() {
        let data: &[u8] = b"0123456789\n";
        let mut reader = BufReader::new(data);
        let mut buf = Vec::new();
        assert!(read_frame(&mut reader, &mut buf, 10).await.unwrap());
        assert_eq!(buf.len(), 10);
    }

    #[tokio::test]
    async fn test_write_frame_appends_newline() {
        let mut out = Vec::new();
        write_frame(&mut out, "{}").await.unwrap();
        assert_eq!(out, b"{}\n");
    }
}
