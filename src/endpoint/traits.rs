//! Endpoint capability seams
//!
//! Trait abstractions the core is written against, enabling real transports
//! and services as well as mocks to plug in without the core knowing the
//! difference.

use async_trait::async_trait;
use serde_json::Value;

use crate::endpoint::error::{HandlerError, TransportError};
use crate::protocol::message::Message;

/// Sink that accepts one framed message for transmission
///
/// Implementations must be safe for concurrent invocation; a single message
/// is written atomically with respect to other producers.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Hand one message to the transport
    async fn consume(&self, message: Message) -> Result<(), TransportError>;
}

/// Capability the core calls to deliver inbound requests and notifications
///
/// The core does not know how the local endpoint is implemented: a
/// registration-based dispatcher, a hand-written match, or generated code
/// all look the same through this trait.
#[async_trait]
pub trait LocalEndpoint: Send + Sync {
    /// Deliver a notification; fire and forget
    async fn notify(&self, method: &str, params: Vec<Value>) -> Result<(), HandlerError>;

    /// Deliver a request and produce its result
    ///
    /// The returned future is dropped when the request is cancelled, so
    /// handlers observe cancellation the usual Rust way.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, HandlerError>;
}
