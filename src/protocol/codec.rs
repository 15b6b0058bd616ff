//! Schema-aware JSON codec
//!
//! Encodes and decodes method params and results against registered method
//! descriptors. The interior of the runtime works with `serde_json::Value`;
//! this layer validates values against the declared parameter and result
//! shapes at the protocol boundary.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::protocol::message::{CANCEL_METHOD, JsonParams, ResponseErrorCode};

// ============================================================================
// Message Issues
// ============================================================================

/// A single problem found while decoding a message payload
#[derive(Debug, Clone, PartialEq)]
pub struct MessageIssue {
    /// Human readable description of the problem
    pub text: String,

    /// Error code the issue maps to on the wire
    pub code: i32,
}

/// Failure raised when a payload cannot be decoded
///
/// Carries the original payload (when known) and the list of issues so the
/// endpoint can report them upstream as `ParseError` or `InvalidParams`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct MessageIssueError {
    /// Joined issue descriptions
    message: String,

    /// Offending payload, if it was captured
    pub payload: Option<Value>,

    /// Problems found, in discovery order
    pub issues: Vec<MessageIssue>,
}

impl MessageIssueError {
    /// Single-issue failure without a captured payload
    pub fn new(text: impl Into<String>, code: ResponseErrorCode) -> Self {
        let text = text.into();
        Self {
            message: text.clone(),
            payload: None,
            issues: vec![MessageIssue {
                text,
                code: code.code(),
            }],
        }
    }

    /// Attach the offending payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

// ============================================================================
// Type Descriptors
// ============================================================================

/// Declared JSON shape of a parameter or result
///
/// Null is accepted by every descriptor: an absent optional argument decodes
/// to null regardless of the declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    /// Any JSON value
    Any,
    /// JSON null only
    Null,
    /// JSON boolean
    Bool,
    /// JSON number
    Number,
    /// JSON string
    String,
    /// JSON object
    Object,
    /// JSON array with homogeneous element type
    List(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Check whether a value matches the declared shape
    pub fn matches(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            TypeDescriptor::Any => true,
            TypeDescriptor::Null => false,
            TypeDescriptor::Bool => value.is_boolean(),
            TypeDescriptor::Number => value.is_number(),
            TypeDescriptor::String => value.is_string(),
            TypeDescriptor::Object => value.is_object(),
            TypeDescriptor::List(element) => match value {
                Value::Array(values) => values.iter().all(|v| element.matches(v)),
                _ => false,
            },
        }
    }

    /// True for list-shaped descriptors
    pub fn is_list(&self) -> bool {
        matches!(self, TypeDescriptor::List(_))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Any => write!(f, "any"),
            TypeDescriptor::Null => write!(f, "null"),
            TypeDescriptor::Bool => write!(f, "boolean"),
            TypeDescriptor::Number => write!(f, "number"),
            TypeDescriptor::String => write!(f, "string"),
            TypeDescriptor::Object => write!(f, "object"),
            TypeDescriptor::List(element) => write!(f, "list of {element}"),
        }
    }
}

// ============================================================================
// Method Descriptors
// ============================================================================

/// Whether a method expects a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Request,
    Notification,
}

/// Registered schema of a JSON-RPC method
///
/// Descriptors are supplied at endpoint construction and are immutable for
/// the life of the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcMethod {
    /// Method name on the wire
    pub name: String,

    /// Declared parameter shapes, in positional order
    pub parameter_types: Vec<TypeDescriptor>,

    /// Declared result shape; `Null` for notifications
    pub result_type: TypeDescriptor,

    /// Request or notification
    pub kind: MethodKind,
}

impl JsonRpcMethod {
    /// Descriptor for a request method
    pub fn request(
        name: impl Into<String>,
        parameter_types: Vec<TypeDescriptor>,
        result_type: TypeDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_types,
            result_type,
            kind: MethodKind::Request,
        }
    }

    /// Descriptor for a notification method
    pub fn notification(name: impl Into<String>, parameter_types: Vec<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            parameter_types,
            result_type: TypeDescriptor::Null,
            kind: MethodKind::Notification,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Method-schema-aware params and result codec
///
/// Owns the per-endpoint method registry plus the built-in `$/cancelRequest`
/// descriptor.
#[derive(Debug)]
pub struct JsonCodec {
    methods: HashMap<String, JsonRpcMethod>,
    cancel_method: JsonRpcMethod,
}

impl JsonCodec {
    /// Build a codec from the methods registered for this endpoint
    pub fn new(methods: impl IntoIterator<Item = JsonRpcMethod>) -> Self {
        let methods = methods
            .into_iter()
            .map(|method| (method.name.clone(), method))
            .collect();
        Self {
            methods,
            cancel_method: JsonRpcMethod::notification(
                CANCEL_METHOD,
                vec![TypeDescriptor::Object],
            ),
        }
    }

    /// Look up the descriptor for a method name
    ///
    /// Falls back to the built-in `$/cancelRequest` descriptor when the name
    /// matches and nothing else is registered.
    pub fn resolve(&self, method: &str) -> Option<&JsonRpcMethod> {
        self.methods.get(method).or_else(|| {
            if method == CANCEL_METHOD {
                Some(&self.cancel_method)
            } else {
                None
            }
        })
    }

    /// Encode positional argument values into wire params
    ///
    /// Zero arguments become an empty object, a single object argument stays
    /// an object, anything else becomes a positional array.
    pub fn serialize_params(
        &self,
        method: &JsonRpcMethod,
        mut values: Vec<Value>,
    ) -> Result<JsonParams, MessageIssueError> {
        if values.len() != method.parameter_types.len() {
            return Err(MessageIssueError::new(
                format!(
                    "method '{}' expects {} argument(s), got {}",
                    method.name,
                    method.parameter_types.len(),
                    values.len()
                ),
                ResponseErrorCode::InvalidParams,
            ));
        }

        if values.is_empty() {
            return Ok(JsonParams::Object(Map::new()));
        }

        if values.len() == 1 {
            return Ok(match values.remove(0) {
                Value::Object(members) => JsonParams::Object(members),
                other => JsonParams::Array(vec![other]),
            });
        }

        Ok(JsonParams::Array(values))
    }

    /// Decode wire params into positional argument values
    ///
    /// Short positional arrays are right-padded with null up to the declared
    /// arity; extras beyond it are ignored. An empty object decodes to a
    /// single undefined argument when the method declares parameters.
    pub fn deserialize_params(
        &self,
        method: &JsonRpcMethod,
        params: Option<&JsonParams>,
    ) -> Result<Vec<Value>, MessageIssueError> {
        let declared = &method.parameter_types;
        let values = match params {
            None => return Ok(Vec::new()),
            Some(JsonParams::Object(members)) if members.is_empty() => {
                // TODO: an intentionally empty object for a declared object
                // parameter is indistinguishable from an absent argument
                // here; kept for wire compatibility with existing clients
                if declared.is_empty() {
                    return Ok(Vec::new());
                }
                vec![Value::Null]
            }
            Some(JsonParams::Object(members)) => vec![Value::Object(members.clone())],
            Some(JsonParams::Array(values)) => {
                if declared.len() == 1 && declared[0].is_list() {
                    // Whole array is the single declared list argument
                    vec![Value::Array(values.clone())]
                } else {
                    if values.len() > declared.len() {
                        debug!(
                            "Ignoring {} extra argument(s) for method '{}'",
                            values.len() - declared.len(),
                            method.name
                        );
                    }
                    values.iter().take(declared.len()).cloned().collect()
                }
            }
        };

        let mut arguments = Vec::with_capacity(declared.len());
        for (position, descriptor) in declared.iter().enumerate() {
            let value = values.get(position).cloned().unwrap_or(Value::Null);
            if !descriptor.matches(&value) {
                return Err(MessageIssueError::new(
                    format!(
                        "argument {} of method '{}' does not match declared type {}",
                        position, method.name, descriptor
                    ),
                    ResponseErrorCode::InvalidParams,
                )
                .with_payload(value));
            }
            arguments.push(value);
        }
        Ok(arguments)
    }

    /// Encode a result value against the declared result type
    pub fn serialize_result(
        &self,
        method: &JsonRpcMethod,
        value: Value,
    ) -> Result<Value, MessageIssueError> {
        if !method.result_type.matches(&value) {
            return Err(MessageIssueError::new(
                format!(
                    "result of method '{}' does not match declared type {}",
                    method.name, method.result_type
                ),
                ResponseErrorCode::InternalError,
            )
            .with_payload(value));
        }
        Ok(value)
    }

    /// Decode a result value against the declared result type
    pub fn deserialize_result(
        &self,
        method: &JsonRpcMethod,
        value: Value,
    ) -> Result<Value, MessageIssueError> {
        if !method.result_type.matches(&value) {
            return Err(MessageIssueError::new(
                format!(
                    "result of method '{}' does not match declared type {}",
                    method.name, method.result_type
                ),
                ResponseErrorCode::InvalidParams,
            )
            .with_payload(value));
        }
        Ok(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> JsonCodec {
        JsonCodec::new([
            JsonRpcMethod::request(
                "request",
                vec![TypeDescriptor::String],
                TypeDescriptor::String,
            ),
            JsonRpcMethod::request(
                "pair",
                vec![TypeDescriptor::String, TypeDescriptor::Number],
                TypeDescriptor::Any,
            ),
            JsonRpcMethod::request("nullary", vec![], TypeDescriptor::Any),
            JsonRpcMethod::request(
                "list",
                vec![TypeDescriptor::List(Box::new(TypeDescriptor::Number))],
                TypeDescriptor::Any,
            ),
            JsonRpcMethod::notification("notification", vec![TypeDescriptor::String]),
        ])
    }

    #[test]
    fn test_resolve_registered_and_builtin() {
        let codec = codec();
        assert_eq!(codec.resolve("request").unwrap().name, "request");
        assert_eq!(codec.resolve(CANCEL_METHOD).unwrap().name, CANCEL_METHOD);
        assert!(codec.resolve("unknown").is_none());
    }

    #[test]
    fn test_serialize_params_zero_args_yields_empty_object() {
        let codec = codec();
        let method = codec.resolve("nullary").unwrap().clone();
        let params = codec.serialize_params(&method, vec![]).unwrap();
        assert_eq!(params, JsonParams::Object(Map::new()));
    }

    #[test]
    fn test_serialize_params_single_non_object_wraps_into_array() {
        let codec = codec();
        let method = codec.resolve("request").unwrap().clone();
        let params = codec
            .serialize_params(&method, vec![json!("myparam")])
            .unwrap();
        assert_eq!(params, JsonParams::Array(vec![json!("myparam")]));
    }

    #[test]
    fn test_serialize_params_single_object_stays_object() {
        let codec = codec();
        let method = JsonRpcMethod::request(
            "configure",
            vec![TypeDescriptor::Object],
            TypeDescriptor::Any,
        );
        let params = codec
            .serialize_params(&method, vec![json!({"key": "value"})])
            .unwrap();
        match params {
            JsonParams::Object(members) => assert_eq!(members.get("key"), Some(&json!("value"))),
            other => panic!("Expected object params, got: {other:?}"),
        }
    }

    #[test]
    fn test_serialize_params_arity_mismatch() {
        let codec = codec();
        let method = codec.resolve("pair").unwrap().clone();
        let result = codec.serialize_params(&method, vec![json!("only one")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_params_absent_is_empty() {
        let codec = codec();
        let method = codec.resolve("request").unwrap().clone();
        assert_eq!(
            codec.deserialize_params(&method, None).unwrap(),
            Vec::<Value>::new()
        );
    }

    #[test]
    fn test_deserialize_params_empty_object_is_single_undefined() {
        let codec = codec();
        let method = codec.resolve("request").unwrap().clone();
        let params = JsonParams::Object(Map::new());
        assert_eq!(
            codec.deserialize_params(&method, Some(&params)).unwrap(),
            vec![Value::Null]
        );
    }

    #[test]
    fn test_deserialize_params_pads_short_array_with_nulls() {
        let codec = codec();
        let method = codec.resolve("pair").unwrap().clone();
        let params = JsonParams::Array(vec![json!("first")]);
        assert_eq!(
            codec.deserialize_params(&method, Some(&params)).unwrap(),
            vec![json!("first"), Value::Null]
        );
    }

    #[test]
    fn test_deserialize_params_discards_extras() {
        let codec = codec();
        let method = codec.resolve("pair").unwrap().clone();
        let params = JsonParams::Array(vec![json!("first"), json!(2), json!("extra")]);
        assert_eq!(
            codec.deserialize_params(&method, Some(&params)).unwrap(),
            vec![json!("first"), json!(2)]
        );
    }

    #[test]
    fn test_deserialize_params_whole_array_as_list_argument() {
        let codec = codec();
        let method = codec.resolve("list").unwrap().clone();
        let params = JsonParams::Array(vec![json!(1), json!(2), json!(3)]);
        assert_eq!(
            codec.deserialize_params(&method, Some(&params)).unwrap(),
            vec![json!([1, 2, 3])]
        );
    }

    #[test]
    fn test_deserialize_params_type_mismatch() {
        let codec = codec();
        let method = codec.resolve("request").unwrap().clone();
        let params = JsonParams::Array(vec![json!(42)]);
        let error = codec.deserialize_params(&method, Some(&params)).unwrap_err();
        assert_eq!(
            error.issues[0].code,
            ResponseErrorCode::InvalidParams.code()
        );
    }

    #[test]
    fn test_params_round_trip() {
        let codec = codec();
        let method = codec.resolve("pair").unwrap().clone();
        let values = vec![json!("name"), json!(7)];

        let params = codec.serialize_params(&method, values.clone()).unwrap();
        assert_eq!(
            codec.deserialize_params(&method, Some(&params)).unwrap(),
            values
        );
    }

    #[test]
    fn test_result_round_trip() {
        let codec = codec();
        let method = codec.resolve("request").unwrap().clone();
        let encoded = codec
            .serialize_result(&method, json!("success"))
            .unwrap();
        assert_eq!(
            codec.deserialize_result(&method, encoded).unwrap(),
            json!("success")
        );
    }

    #[test]
    fn test_result_type_mismatch() {
        let codec = codec();
        let method = codec.resolve("request").unwrap().clone();
        assert!(codec.deserialize_result(&method, json!(13)).is_err());
    }

    #[test]
    fn test_type_descriptor_accepts_null_everywhere() {
        for descriptor in [
            TypeDescriptor::Any,
            TypeDescriptor::Bool,
            TypeDescriptor::String,
            TypeDescriptor::Object,
            TypeDescriptor::List(Box::new(TypeDescriptor::Number)),
        ] {
            assert!(descriptor.matches(&Value::Null));
        }
    }
}
