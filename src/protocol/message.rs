//! JSON-RPC 2.0 message model
//!
//! Defines the typed message envelopes exchanged between endpoints and their
//! (de)serialization to the JSON-RPC 2.0 wire format as per
//! https://www.jsonrpc.org/specification

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::protocol::codec::MessageIssueError;

// ============================================================================
// JSON-RPC 2.0 Constants
// ============================================================================

/// JSON-RPC 2.0 version identifier
pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved notification method used to cancel an in-flight request
pub const CANCEL_METHOD: &str = "$/cancelRequest";

// ============================================================================
// Message Identifiers
// ============================================================================

/// Request identifier
///
/// JSON-RPC allows both string and number ids. Equality and hashing are by
/// tag and payload; `Display` renders strings quoted and numbers bare, which
/// is the convention used in protocol error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Numeric identifier
    Number(i64),

    /// String identifier
    String(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{n}"),
            MessageId::String(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        MessageId::Number(n)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId::String(s.to_string())
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Parameters of a request or notification
///
/// JSON-RPC 2.0 restricts `params` to an array (by-position) or an object
/// (by-name). Absent params are modelled as `Option<JsonParams>::None` on the
/// enclosing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonParams {
    /// Positional parameters
    Array(Vec<Value>),

    /// Named parameters
    Object(Map<String, Value>),
}

impl JsonParams {
    /// Number of positional entries or named members
    pub fn len(&self) -> usize {
        match self {
            JsonParams::Array(values) => values.len(),
            JsonParams::Object(members) => members.len(),
        }
    }

    /// True when there are no entries at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert into a plain JSON value
    pub fn into_value(self) -> Value {
        match self {
            JsonParams::Array(values) => Value::Array(values),
            JsonParams::Object(members) => Value::Object(members),
        }
    }
}

// ============================================================================
// Error Objects
// ============================================================================

/// JSON-RPC error object carried by error responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Create an error object from a well-known code
    pub fn new(code: ResponseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }

    /// Attach additional data to the error object
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// JSON-RPC error codes, wire-stable
///
/// Includes the codes reserved by the JSON-RPC 2.0 specification plus the
/// extended codes used by LSP-style protocols for initialization state and
/// request cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResponseErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    ServerNotInitialized = -32002,
    RequestCancelled = -32800,
    ContentModified = -32801,
}

impl ResponseErrorCode {
    /// Numeric wire representation of the code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Check if the given code is in the reserved server error range
    pub fn is_server_error(code: i32) -> bool {
        (-32099..=-32000).contains(&code)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Parameters of the reserved `$/cancelRequest` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelParams {
    /// Id of the request to cancel
    pub id: MessageId,
}

// ============================================================================
// Messages
// ============================================================================

/// A single JSON-RPC 2.0 message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Request expecting exactly one response with a matching id
    Request {
        id: MessageId,
        method: String,
        params: Option<JsonParams>,
    },

    /// Fire-and-forget notification
    Notification {
        method: String,
        params: Option<JsonParams>,
    },

    /// Successful response to a request
    Response { id: MessageId, result: Value },

    /// Error response; the id is `None` when the request id could not be
    /// parsed in the first place
    ErrorResponse {
        id: Option<MessageId>,
        error: ResponseError,
    },
}

impl Message {
    /// Build a successful response
    pub fn response(id: MessageId, result: Value) -> Self {
        Message::Response { id, result }
    }

    /// Build an error response
    pub fn error_response(id: Option<MessageId>, error: ResponseError) -> Self {
        Message::ErrorResponse { id, error }
    }

    /// Build a `$/cancelRequest` notification for the given id
    pub fn cancel_notification(id: MessageId) -> Self {
        let mut members = Map::new();
        members.insert("id".to_string(), id_to_value(&id));
        Message::Notification {
            method: CANCEL_METHOD.to_string(),
            params: Some(JsonParams::Object(members)),
        }
    }

    /// Method name of a request or notification, if any
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Serialize into a JSON-RPC 2.0 envelope
    pub fn to_json(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert(
            "jsonrpc".to_string(),
            Value::String(JSONRPC_VERSION.to_string()),
        );

        match self {
            Message::Request { id, method, params } => {
                envelope.insert("id".to_string(), id_to_value(id));
                envelope.insert("method".to_string(), Value::String(method.clone()));
                if let Some(params) = params {
                    envelope.insert("params".to_string(), params.clone().into_value());
                }
            }
            Message::Notification { method, params } => {
                envelope.insert("method".to_string(), Value::String(method.clone()));
                if let Some(params) = params {
                    envelope.insert("params".to_string(), params.clone().into_value());
                }
            }
            Message::Response { id, result } => {
                envelope.insert("id".to_string(), id_to_value(id));
                envelope.insert("result".to_string(), result.clone());
            }
            Message::ErrorResponse { id, error } => {
                let id = match id {
                    Some(id) => id_to_value(id),
                    None => Value::Null,
                };
                envelope.insert("id".to_string(), id);
                // ResponseError serialization is infallible: code and message
                // are plain fields, data is already a Value
                let error = serde_json::to_value(error).unwrap_or(Value::Null);
                envelope.insert("error".to_string(), error);
            }
        }

        Value::Object(envelope)
    }

    /// Classify and parse a JSON-RPC 2.0 envelope
    ///
    /// Classification follows the specification: a `method` member with a
    /// non-null `id` is a request, a `method` member without one is a
    /// notification, an `id` without a `method` is a response. Anything else
    /// is reported as a message issue.
    pub fn from_json(value: Value) -> Result<Self, MessageIssueError> {
        let Value::Object(envelope) = &value else {
            return Err(invalid(&value, "message is not a JSON object"));
        };

        match envelope.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            _ => return Err(invalid(&value, "missing or unsupported jsonrpc version")),
        }

        let method = envelope
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = envelope.get("id").cloned();

        match (method, id) {
            (Some(method), Some(id)) if !id.is_null() => {
                let id = parse_id(&value, id)?;
                let params = parse_params(&value, envelope.get("params"))?;
                Ok(Message::Request { id, method, params })
            }
            (Some(method), _) => {
                let params = parse_params(&value, envelope.get("params"))?;
                Ok(Message::Notification { method, params })
            }
            (None, Some(id)) => {
                if let Some(error) = envelope.get("error") {
                    let error: ResponseError = serde_json::from_value(error.clone())
                        .map_err(|e| invalid(&value, format!("malformed error object: {e}")))?;
                    let id = if id.is_null() {
                        None
                    } else {
                        Some(parse_id(&value, id)?)
                    };
                    Ok(Message::ErrorResponse { id, error })
                } else if id.is_null() {
                    Err(invalid(&value, "response with null id must carry an error"))
                } else {
                    let id = parse_id(&value, id)?;
                    let result = envelope.get("result").cloned().unwrap_or(Value::Null);
                    Ok(Message::Response { id, result })
                }
            }
            _ => Err(invalid(&value, "missing required members")),
        }
    }
}

fn id_to_value(id: &MessageId) -> Value {
    match id {
        MessageId::Number(n) => Value::Number((*n).into()),
        MessageId::String(s) => Value::String(s.clone()),
    }
}

fn parse_id(payload: &Value, id: Value) -> Result<MessageId, MessageIssueError> {
    match id {
        Value::Number(n) => n
            .as_i64()
            .map(MessageId::Number)
            .ok_or_else(|| invalid(payload, "non-integer request id")),
        Value::String(s) => Ok(MessageId::String(s)),
        other => Err(invalid(payload, format!("invalid request id: {other}"))),
    }
}

fn parse_params(
    payload: &Value,
    params: Option<&Value>,
) -> Result<Option<JsonParams>, MessageIssueError> {
    match params {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(values)) => Ok(Some(JsonParams::Array(values.clone()))),
        Some(Value::Object(members)) => Ok(Some(JsonParams::Object(members.clone()))),
        Some(other) => Err(invalid(
            payload,
            format!("params must be an array or object, got {other}"),
        )),
    }
}

fn invalid(payload: &Value, text: impl Into<String>) -> MessageIssueError {
    MessageIssueError::new(text, ResponseErrorCode::InvalidRequest)
        .with_payload(payload.clone())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let message = Message::Request {
            id: MessageId::Number(1),
            method: "request".to_string(),
            params: Some(JsonParams::Array(vec![json!("myparam")])),
        };

        let encoded = message.to_json();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "id": 1, "method": "request", "params": ["myparam"]})
        );

        let decoded = Message::from_json(encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_string_id_round_trip() {
        let message = Message::Request {
            id: MessageId::String("1".to_string()),
            method: "request".to_string(),
            params: None,
        };

        let encoded = message.to_json();
        assert_eq!(encoded["id"], json!("1"));
        assert_eq!(Message::from_json(encoded).unwrap(), message);
    }

    #[test]
    fn test_notification_without_params() {
        let decoded =
            Message::from_json(json!({"jsonrpc": "2.0", "method": "initialized"})).unwrap();
        assert_eq!(
            decoded,
            Message::Notification {
                method: "initialized".to_string(),
                params: None,
            }
        );
    }

    #[test]
    fn test_notification_with_null_id_is_notification() {
        let decoded =
            Message::from_json(json!({"jsonrpc": "2.0", "id": null, "method": "m"})).unwrap();
        assert!(matches!(decoded, Message::Notification { .. }));
    }

    #[test]
    fn test_error_response_with_null_id() {
        let decoded = Message::from_json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        }))
        .unwrap();

        match decoded {
            Message::ErrorResponse { id, error } => {
                assert_eq!(id, None);
                assert_eq!(error.code, ResponseErrorCode::ParseError.code());
            }
            other => panic!("Expected error response, got: {other:?}"),
        }
    }

    #[test]
    fn test_result_response_with_null_id_is_rejected() {
        let result = Message::from_json(json!({"jsonrpc": "2.0", "id": null, "result": 7}));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_jsonrpc_version_is_rejected() {
        let result = Message::from_json(json!({"id": 1, "method": "request"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_scalar_params_are_rejected() {
        let result =
            Message::from_json(json!({"jsonrpc": "2.0", "method": "m", "params": "scalar"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_null_result_survives_round_trip() {
        let message = Message::Response {
            id: MessageId::Number(3),
            result: Value::Null,
        };

        let encoded = message.to_json();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "id": 3, "result": null}));
        assert_eq!(Message::from_json(encoded).unwrap(), message);
    }

    #[test]
    fn test_id_rendering() {
        assert_eq!(MessageId::Number(7).to_string(), "7");
        assert_eq!(MessageId::String("7".to_string()).to_string(), "\"7\"");
    }

    #[test]
    fn test_cancel_notification_shape() {
        let message = Message::cancel_notification(MessageId::Number(4));
        assert_eq!(
            message.to_json(),
            json!({"jsonrpc": "2.0", "method": "$/cancelRequest", "params": {"id": 4}})
        );
    }
}
