//! Bidirectional JSON-RPC 2.0 endpoint runtime
//!
//! Turns a byte-stream transport into a symmetric request/notification
//! exchange between a local service and a remote peer, with proper
//! separation of concerns:
//!
//! - **Protocol**: message model, schema-aware codec, Content-Length framing
//! - **Endpoint**: dispatch, request correlation, cancellation, error shaping
//! - **Logging**: tracing-subscriber configuration helpers
//!
//! Example usage with direct component coordination:
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use jsonrpc_endpoint::endpoint::{ServiceEndpoint, connect};
//! use jsonrpc_endpoint::protocol::{JsonRpcMethod, TypeDescriptor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let methods = vec![JsonRpcMethod::request(
//!     "greet",
//!     vec![TypeDescriptor::String],
//!     TypeDescriptor::String,
//! )];
//!
//! let service = Arc::new(ServiceEndpoint::new().on_request("greet", |mut params| async move {
//!     Ok(json!(format!("hello {}", params.remove(0))))
//! }));
//!
//! let (endpoint, pump) = connect(tokio::io::stdin(), tokio::io::stdout(), service, methods);
//! tokio::spawn(pump.run());
//!
//! let pending = endpoint.request("greet", vec![json!("world")]).await?;
//! let greeting = pending.await?;
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod logging;
pub mod protocol;

// Re-export main types for convenience
pub use endpoint::{
    EndpointError, HandlerError, LocalEndpoint, MessageConsumer, MessagePump, MessageWriter,
    PendingResponse, RemoteEndpoint, ServiceEndpoint, TransportError, connect,
};
pub use protocol::{
    FramedReader, FramedWriter, JsonCodec, JsonRpcMethod, Message, MessageId, MethodKind,
    ResponseError, ResponseErrorCode, TypeDescriptor,
};
