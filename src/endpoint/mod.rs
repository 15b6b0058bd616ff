//! Endpoint layer - bidirectional JSON-RPC runtime
//!
//! Builds the runtime on top of the protocol layer:
//!
//! - **Traits**: the `MessageConsumer` and `LocalEndpoint` capability seams
//! - **RemoteEndpoint**: inbound dispatch, outbound correlation, cancellation
//! - **ServiceEndpoint**: registration-based local dispatch
//! - **Pump**: the read loop and the framed write sink
//! - **Testing**: mock implementations for exercising the runtime

pub mod error;
pub mod pump;
pub mod remote;
pub mod service;
pub mod testing;
pub mod traits;

pub use error::{EndpointError, HandlerError, TransportError};
pub use pump::{MessagePump, MessageWriter, connect};
pub use remote::{ExceptionHandler, PendingResponse, RemoteEndpoint, default_exception_handler};
pub use service::ServiceEndpoint;
pub use traits::{LocalEndpoint, MessageConsumer};
