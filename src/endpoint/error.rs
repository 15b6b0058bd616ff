//! Endpoint error types
//!
//! Separates the three failure domains of the runtime: the transport (wire
//! I/O), local handlers (user code), and the endpoint itself (what outbound
//! callers observe).

use crate::protocol::codec::MessageIssueError;
use crate::protocol::message::ResponseError;

/// Failure of the underlying transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Transport failure: {0}")]
    Failed(String),
}

/// Failure raised by a local handler
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A deliberate protocol error; the embedded error object is sent to the
    /// peer verbatim
    #[error("{0}")]
    Response(ResponseError),

    /// No handler is registered for the method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The handler observed cancellation and stopped
    #[error("Request was cancelled")]
    Cancelled,

    /// Any other handler failure; shaped into an internal error response
    #[error("{0}")]
    Failure(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap an arbitrary failure message
    pub fn failure(message: impl Into<String>) -> Self {
        HandlerError::Failure(message.into().into())
    }
}

impl From<ResponseError> for HandlerError {
    fn from(error: ResponseError) -> Self {
        HandlerError::Response(error)
    }
}

/// Failure observed by an outbound caller
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The peer answered with an error response
    #[error("{0}")]
    Response(ResponseError),

    /// The request was cancelled before a response arrived
    #[error("Request was cancelled")]
    Cancelled,

    /// Params or result could not be encoded or decoded
    #[error("{0}")]
    Codec(#[from] MessageIssueError),

    /// The transport failed or closed while the request was pending
    #[error("{0}")]
    Transport(#[from] TransportError),
}
