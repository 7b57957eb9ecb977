//! Line-delimited JSON framing
//!
//! Every message is a single JSON object followed by `\n`:
//! ```text
//! {"method":"status"}\n
//! ```
//!
//! Readers reject lines longer than a caller-chosen limit to bound memory use
//! per connection. Requests are small and read with [`MAX_LINE_LEN`];
//! responses grow with the number of slots and are read with
//! [`MAX_RESPONSE_LEN`]. Writers never truncate or refuse a message.

use crate::error::{ProtocolError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted request line length (64 KiB), newline included
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Maximum accepted response line length (16 MiB), newline included
pub const MAX_RESPONSE_LEN: usize = 16 * 1024 * 1024;

/// Serialize a message into a newline-terminated JSON line
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse one JSON line (trailing newline and whitespace are ignored)
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(line.trim_ascii())?)
}

fn finish_line(buf: &[u8], max: usize) -> Result<()> {
    if buf.is_empty() {
        return Err(ProtocolError::Closed);
    }
    if buf.len() > max {
        return Err(ProtocolError::LineTooLarge {
            size: buf.len(),
            max,
        });
    }
    Ok(())
}

/// Read and decode one request-sized line from a blocking reader
pub fn read_line<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    read_line_limited(reader, MAX_LINE_LEN)
}

/// Read and decode one line of at most `max` bytes from a blocking reader
pub fn read_line_limited<R: BufRead, T: DeserializeOwned>(reader: &mut R, max: usize) -> Result<T> {
    let mut buf = Vec::new();
    reader
        .by_ref()
        .take(max as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    finish_line(&buf, max)?;
    decode_line(&buf)
}

/// Encode and write one line to a blocking writer
pub fn write_line<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let line = encode_line(message)?;
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Read and decode one request-sized line from an async reader
///
/// Returns [`ProtocolError::Closed`] on a clean end of stream.
#[cfg(feature = "async")]
pub async fn read_line_async<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    read_line_async_limited(reader, MAX_LINE_LEN).await
}

/// Read and decode one line of at most `max` bytes from an async reader
#[cfg(feature = "async")]
pub async fn read_line_async_limited<R, T>(reader: &mut R, max: usize) -> Result<T>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    (&mut *reader)
        .take(max as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    finish_line(&buf, max)?;
    decode_line(&buf)
}

/// Encode and write one line to an async writer
#[cfg(feature = "async")]
pub async fn write_line_async<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(message)?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Request;
    use std::io::Cursor;

    #[test]
    fn test_encode_appends_newline() {
        let line = encode_line(&Request::Status).unwrap();
        assert_eq!(line, b"{\"method\":\"status\"}\n");
    }

    #[test]
    fn test_decode_tolerates_crlf() {
        let req: Request = decode_line(b"{\"method\":\"info\"}\r\n").unwrap();
        assert_eq!(req, Request::Info);
    }

    #[test]
    fn test_read_multiple_lines() {
        let mut cursor = Cursor::new(b"{\"method\":\"status\"}\n{\"method\":\"info\"}\n".to_vec());
        let first: Request = read_line(&mut cursor).unwrap();
        let second: Request = read_line(&mut cursor).unwrap();
        assert_eq!(first, Request::Status);
        assert_eq!(second, Request::Info);
        assert!(matches!(
            read_line::<_, Request>(&mut cursor),
            Err(ProtocolError::Closed)
        ));
    }

    #[test]
    fn test_read_rejects_oversized_line() {
        let mut data = vec![b'a'; MAX_LINE_LEN + 10];
        data.push(b'\n');
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            read_line::<_, Request>(&mut cursor),
            Err(ProtocolError::LineTooLarge { .. })
        ));
    }

    #[test]
    fn test_large_response_encodes_and_reads_with_response_limit() {
        use crate::messages::Response;

        let resp = Response::error("x".repeat(MAX_LINE_LEN * 2));
        let line = encode_line(&resp).unwrap();
        assert!(line.len() > MAX_LINE_LEN);

        let mut cursor = Cursor::new(line.clone());
        assert!(matches!(
            read_line::<_, Response>(&mut cursor),
            Err(ProtocolError::LineTooLarge { .. })
        ));

        let mut cursor = Cursor::new(line);
        let decoded: Response = read_line_limited(&mut cursor, MAX_RESPONSE_LEN).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn test_read_invalid_json() {
        let mut cursor = Cursor::new(b"not json\n".to_vec());
        assert!(matches!(
            read_line::<_, Request>(&mut cursor),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_write_then_read() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = client;
        write_line_async(&mut client, &Request::Stop { slot_key: "k".to_string() })
            .await
            .unwrap();
        drop(client);

        let mut reader = tokio::io::BufReader::new(server);
        let req: Request = read_line_async(&mut reader).await.unwrap();
        assert_eq!(
            req,
            Request::Stop {
                slot_key: "k".to_string()
            }
        );
        assert!(matches!(
            read_line_async::<_, Request>(&mut reader).await,
            Err(ProtocolError::Closed)
        ));
    }
}
