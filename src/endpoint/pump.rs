//! Concurrent message pump
//!
//! Drives the framed reader until end of file and feeds every decoded
//! message to the endpoint. The write side lives here too: `MessageWriter`
//! turns a framed writer into a `MessageConsumer` safe for concurrent
//! producers.

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};

use crate::endpoint::error::TransportError;
use crate::endpoint::remote::RemoteEndpoint;
use crate::endpoint::traits::{LocalEndpoint, MessageConsumer};
use crate::protocol::codec::{JsonRpcMethod, MessageIssueError};
use crate::protocol::framing::{FramedReader, FramedWriter, FramingError};
use crate::protocol::message::{Message, ResponseErrorCode};

// ============================================================================
// Message Writer
// ============================================================================

/// Message consumer writing framed messages to a byte stream
///
/// A mutex around the writer serializes concurrent producers so header and
/// body of one message never interleave with another.
pub struct MessageWriter<W> {
    writer: tokio::sync::Mutex<FramedWriter<W>>,
}

impl<W: AsyncWrite + Unpin + Send> MessageWriter<W> {
    /// Create a message writer over a byte stream
    pub fn new(output: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(FramedWriter::new(output)),
        }
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageConsumer for MessageWriter<W> {
    async fn consume(&self, message: Message) -> Result<(), TransportError> {
        let payload = message.to_json().to_string();
        let mut writer = self.writer.lock().await;
        writer
            .write_message(&payload)
            .await
            .map_err(into_transport_error)
    }
}

fn into_transport_error(error: FramingError) -> TransportError {
    match error {
        FramingError::Io(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            TransportError::Closed
        }
        other => TransportError::Failed(other.to_string()),
    }
}

// ============================================================================
// Message Pump
// ============================================================================

/// Reads messages from the input stream and dispatches them to the endpoint
pub struct MessagePump<R> {
    endpoint: RemoteEndpoint,
    reader: FramedReader<R>,
}

impl<R: AsyncRead + Unpin> MessagePump<R> {
    /// Create a pump feeding the given endpoint
    pub fn new(endpoint: RemoteEndpoint, reader: FramedReader<R>) -> Self {
        Self { endpoint, reader }
    }

    /// Run until the input stream ends
    ///
    /// A clean end of file returns `Ok(())`; any other transport failure is
    /// returned after failing every pending outbound request. Malformed
    /// frames and unparseable payloads are reported to the peer as parse
    /// errors and reading continues.
    pub async fn run(mut self) -> Result<(), TransportError> {
        loop {
            match self.reader.read_message().await {
                Ok(Some(payload)) => self.dispatch(payload).await,
                Ok(None) => {
                    debug!("Input stream closed, shutting down endpoint");
                    self.endpoint.fail_pending_requests(&TransportError::Closed);
                    return Ok(());
                }
                Err(issue) if issue.is_recoverable() => {
                    warn!("Malformed frame: {issue}");
                    self.endpoint
                        .report_issue(MessageIssueError::new(
                            issue.to_string(),
                            ResponseErrorCode::ParseError,
                        ))
                        .await;
                }
                Err(failure) => {
                    error!("Transport failure: {failure}");
                    let failure = TransportError::Failed(failure.to_string());
                    self.endpoint.fail_pending_requests(&failure);
                    return Err(failure);
                }
            }
        }
    }

    async fn dispatch(&self, payload: String) {
        let message = serde_json::from_str::<Value>(&payload)
            .map_err(|e| {
                MessageIssueError::new(
                    format!("JSON parse error: {e}"),
                    ResponseErrorCode::ParseError,
                )
            })
            .and_then(Message::from_json);

        match message {
            Ok(message) => self.endpoint.consume(message).await,
            Err(issue) => {
                warn!("Dropping unparseable message: {issue}");
                self.endpoint.report_issue(issue).await;
            }
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Wire an endpoint and its pump over a pair of byte streams
///
/// The returned endpoint is ready for outbound calls; the pump must be
/// driven (usually on its own task) for inbound traffic and responses to
/// flow.
pub fn connect<R, W>(
    input: R,
    output: W,
    local: Arc<dyn LocalEndpoint>,
    methods: impl IntoIterator<Item = JsonRpcMethod>,
) -> (RemoteEndpoint, MessagePump<R>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(MessageWriter::new(output));
    let endpoint = RemoteEndpoint::new(writer, local, methods);
    let pump = MessagePump::new(endpoint.clone(), FramedReader::new(input));
    (endpoint, pump)
}

// ============================================================================
// Tests
// ============================================================================
