//! Message framing layer
//!
//! Handles Content-Length message framing over byte streams as used by
//! LSP-style JSON-RPC transports.
//!
//! Wire format:
//! Content-Length: <length>\r\n[Content-Type: <type>\r\n]\r\n<content>

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

/// Maximum message size to prevent memory exhaustion
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Error types for message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid content length: {0}")]
    InvalidContentLength(String),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Stream ended in the middle of a message")]
    UnexpectedEof,
}

impl FramingError {
    /// Whether the reader can keep going after this error
    ///
    /// Recoverable errors describe a malformed frame; the reader discards
    /// input until the next `Content-Length:` header on the following read.
    /// Everything else is a transport failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FramingError::InvalidContentLength(_)
                | FramingError::MessageTooLarge { .. }
                | FramingError::InvalidUtf8
        )
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Reads Content-Length framed messages from a byte stream
///
/// Returns one message payload per call. Input that does not belong to a
/// well-formed frame is discarded until the next `Content-Length:` header,
/// so a single malformed frame does not poison the stream.
pub struct FramedReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    /// Create a framed reader over a byte stream
    pub fn new(input: R) -> Self {
        Self {
            reader: BufReader::new(input),
            line: String::new(),
        }
    }

    /// Read the next message payload
    ///
    /// Returns `Ok(None)` when the stream has reached a clean end of file.
    pub async fn read_message(&mut self) -> Result<Option<String>, FramingError> {
        let content_length = match self.read_headers().await? {
            Some(length) => length,
            None => return Ok(None),
        };

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FramingError::UnexpectedEof
            } else {
                FramingError::Io(e)
            }
        })?;

        trace!("FramedReader: Read complete message ({content_length} bytes)");
        String::from_utf8(body)
            .map(Some)
            .map_err(|_| FramingError::InvalidUtf8)
    }

    /// Read header lines until the blank separator, returning Content-Length
    ///
    /// Lines before the `Content-Length:` header that do not belong to a
    /// frame are discarded; this is what resynchronizes the stream after a
    /// malformed frame.
    async fn read_headers(&mut self) -> Result<Option<usize>, FramingError> {
        let mut content_length: Option<usize> = None;

        loop {
            self.line.clear();
            let bytes_read = self.reader.read_line(&mut self.line).await?;
            if bytes_read == 0 {
                return match content_length {
                    None => Ok(None),
                    Some(_) => Err(FramingError::UnexpectedEof),
                };
            }

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                if content_length.is_some() {
                    break;
                }
                // Stray blank line outside a frame
                continue;
            }

            if let Some(length_str) = trimmed.strip_prefix("Content-Length:") {
                let length_str = length_str.trim();
                let length = length_str
                    .parse::<usize>()
                    .map_err(|_| FramingError::InvalidContentLength(length_str.to_string()))?;

                if length > MAX_MESSAGE_SIZE {
                    return Err(FramingError::MessageTooLarge {
                        size: length,
                        max: MAX_MESSAGE_SIZE,
                    });
                }

                content_length = Some(length);
            } else if content_length.is_some() {
                // Additional header such as Content-Type
                trace!("FramedReader: Ignoring header: {trimmed}");
            } else {
                trace!("FramedReader: Discarding input outside a frame: {trimmed}");
            }
        }

        Ok(content_length)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes Content-Length framed messages to a byte stream
///
/// Header and body of one message are written back to back and flushed
/// before the call returns; callers serialize calls to keep concurrent
/// producers from interleaving.
pub struct FramedWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    /// Create a framed writer over a byte stream
    pub fn new(output: W) -> Self {
        Self { writer: output }
    }

    /// Frame and write one message payload
    pub async fn write_message(&mut self, payload: &str) -> Result<(), FramingError> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());

        trace!(
            "FramedWriter: Writing framed message ({} bytes content)",
            payload.len()
        );

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(payload.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &str) -> String {
        format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload)
    }

    #[tokio::test]
    async fn test_write_message_frames_payload() {
        let mut output = Vec::new();
        let mut writer = FramedWriter::new(&mut output);

        let payload = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        writer.write_message(payload).await.unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), framed(payload));
    }

    #[tokio::test]
    async fn test_read_single_message() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let input = framed(payload);
        let mut reader = FramedReader::new(input.as_bytes());

        assert_eq!(reader.read_message().await.unwrap(), Some(payload.to_string()));
        assert_eq!(reader.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_multiple_messages() {
        let first = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let second = r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#;
        let input = format!("{}{}", framed(first), framed(second));
        let mut reader = FramedReader::new(input.as_bytes());

        assert_eq!(reader.read_message().await.unwrap(), Some(first.to_string()));
        assert_eq!(reader.read_message().await.unwrap(), Some(second.to_string()));
        assert_eq!(reader.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_content_type_header_is_ignored() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let input = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            payload.len(),
            payload
        );
        let mut reader = FramedReader::new(input.as_bytes());

        assert_eq!(reader.read_message().await.unwrap(), Some(payload.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_content_length() {
        let input = "Content-Length: invalid\r\n\r\n{}";
        let mut reader = FramedReader::new(input.as_bytes());

        let error = reader.read_message().await.unwrap_err();
        assert!(matches!(error, FramingError::InvalidContentLength(_)));
        assert!(error.is_recoverable());
    }

    #[tokio::test]
    async fn test_resynchronizes_after_malformed_frame() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"result":"ok"}"#;
        let input = format!(
            "Content-Length: bogus\r\n\r\ngarbage bytes\r\n{}",
            framed(payload)
        );
        let mut reader = FramedReader::new(input.as_bytes());

        assert!(reader.read_message().await.is_err());
        // Everything up to the next Content-Length header is discarded
        assert_eq!(reader.read_message().await.unwrap(), Some(payload.to_string()));
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let input = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_SIZE + 1);
        let mut reader = FramedReader::new(input.as_bytes());

        match reader.read_message().await.unwrap_err() {
            FramingError::MessageTooLarge { size, max } => {
                assert_eq!(size, MAX_MESSAGE_SIZE + 1);
                assert_eq!(max, MAX_MESSAGE_SIZE);
            }
            other => panic!("Expected MessageTooLarge error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eof_mid_body_is_not_recoverable() {
        let input = "Content-Length: 100\r\n\r\n{\"partial\":";
        let mut reader = FramedReader::new(input.as_bytes());

        let error = reader.read_message().await.unwrap_err();
        assert!(matches!(error, FramingError::UnexpectedEof));
        assert!(!error.is_recoverable());
    }

    #[tokio::test]
    async fn test_empty_stream_is_clean_eof() {
        let mut reader = FramedReader::new(&b""[..]);
        assert_eq!(reader.read_message().await.unwrap(), None);
    }
}
