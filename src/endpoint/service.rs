//! Registration-based local endpoint
//!
//! `ServiceEndpoint` wires method names to handler closures registered at
//! construction time. It is the plain-Rust replacement for reflective
//! handler binding: services register what they serve, and anything else
//! fails with `MethodNotFound`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::endpoint::error::HandlerError;
use crate::endpoint::traits::LocalEndpoint;

/// Type alias for request handler to reduce complexity
type RequestHandler = Box<
    dyn Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>
        + Send
        + Sync,
>;

/// Type alias for notification handler to reduce complexity
type NotificationHandler = Box<
    dyn Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>
        + Send
        + Sync,
>;

/// Local endpoint dispatching to explicitly registered handlers
#[derive(Default)]
pub struct ServiceEndpoint {
    requests: HashMap<String, RequestHandler>,
    notifications: HashMap<String, NotificationHandler>,
}

impl ServiceEndpoint {
    /// Create an endpoint with no handlers registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request handler for a method name
    pub fn on_request<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.requests.insert(
            method.into(),
            Box::new(move |params| Box::pin(handler(params))),
        );
        self
    }

    /// Register a notification handler for a method name
    pub fn on_notification<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.notifications.insert(
            method.into(),
            Box::new(move |params| Box::pin(handler(params))),
        );
        self
    }
}

#[async_trait]
impl LocalEndpoint for ServiceEndpoint {
    async fn notify(&self, method: &str, params: Vec<Value>) -> Result<(), HandlerError> {
        match self.notifications.get(method) {
            Some(handler) => handler(params).await,
            None => Err(HandlerError::MethodNotFound(method.to_string())),
        }
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, HandlerError> {
        match self.requests.get(method) {
            Some(handler) => handler(params).await,
            None => Err(HandlerError::MethodNotFound(method.to_string())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_registered_request_handler_is_invoked() {
        let service = ServiceEndpoint::new().on_request("echo", |mut params| async move {
            Ok(params.pop().unwrap_or(Value::Null))
        });

        let result = service.request("echo", vec![json!("hello")]).await.unwrap();
        assert_eq!(result, json!("hello"));
    }

    #[tokio::test]
    async fn test_registered_notification_handler_is_invoked() {
        let service = ServiceEndpoint::new().on_notification("ping", |_params| async { Ok(()) });

        assert!(service.notify("ping", vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_method_fails_with_method_not_found() {
        let service = ServiceEndpoint::new();

        let error = service.request("missing", vec![]).await.unwrap_err();
        assert!(matches!(error, HandlerError::MethodNotFound(name) if name == "missing"));
    }
}
