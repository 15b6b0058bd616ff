//! Protocol layer - message model, schema-aware codec, and wire framing
//!
//! This layer knows the JSON-RPC 2.0 wire format and nothing about
//! dispatching:
//!
//! - **Message model**: typed envelopes and their (de)serialization
//! - **Codec**: params/result encoding against registered method schemas
//! - **Framing**: Content-Length delimited frames over byte streams

pub mod codec;
pub mod framing;
pub mod message;

pub use codec::{
    JsonCodec, JsonRpcMethod, MessageIssue, MessageIssueError, MethodKind, TypeDescriptor,
};
pub use framing::{FramedReader, FramedWriter, FramingError};
pub use message::{
    CANCEL_METHOD, CancelParams, JSONRPC_VERSION, JsonParams, Message, MessageId, ResponseError,
    ResponseErrorCode,
};
