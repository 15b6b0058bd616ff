//! Testing utilities and mock implementations
//!
//! Provides mock implementations of the endpoint capability traits for
//! exercising the runtime without a real transport or service.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::endpoint::error::{HandlerError, TransportError};
use crate::endpoint::traits::{LocalEndpoint, MessageConsumer};
use crate::protocol::message::{Message, ResponseError};

// ============================================================================
// Mock Message Consumer
// ============================================================================

/// Message consumer that records everything handed to it
///
/// An injected failure makes subsequent `consume` calls fail without
/// recording, mimicking a broken transport.
pub struct MockConsumer {
    sent: Mutex<Vec<Message>>,
    failure: Mutex<Option<TransportError>>,
    tx: mpsc::UnboundedSender<Message>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl MockConsumer {
    /// Create a consumer that accepts every message
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// All messages consumed so far
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    /// Make subsequent consume calls fail with the given error
    pub fn fail_with(&self, error: TransportError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Restore normal operation after `fail_with`
    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Wait for the next consumed message
    pub async fn next_message(&self) -> Message {
        let mut rx = self.rx.lock().await;
        rx.recv().await.expect("mock consumer channel closed")
    }
}

impl Default for MockConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageConsumer for MockConsumer {
    async fn consume(&self, message: Message) -> Result<(), TransportError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(message.clone());
        let _ = self.tx.send(message);
        Ok(())
    }
}

// ============================================================================
// Recording Local Endpoint
// ============================================================================

#[derive(Clone)]
enum Script {
    Respond(Value),
    Fail(String),
    FailError(ResponseError),
    Hang,
}

/// Local endpoint that records deliveries and replays scripted results
pub struct RecordingEndpoint {
    notifications: Mutex<Vec<(String, Vec<Value>)>>,
    requests: Mutex<Vec<(String, Vec<Value>)>>,
    scripts: Mutex<HashMap<String, Script>>,
}

impl RecordingEndpoint {
    /// Create an endpoint that answers every request with null
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    /// Script a successful result for a method
    pub fn respond_with(&self, method: &str, result: Value) {
        self.script(method, Script::Respond(result));
    }

    /// Script a handler failure for a method
    pub fn fail_with(&self, method: &str, message: &str) {
        self.script(method, Script::Fail(message.to_string()));
    }

    /// Script a deliberate protocol error for a method
    pub fn fail_with_error(&self, method: &str, error: ResponseError) {
        self.script(method, Script::FailError(error));
    }

    /// Make a method never complete until its request is cancelled
    pub fn hang(&self, method: &str) {
        self.script(method, Script::Hang);
    }

    /// Notifications delivered so far
    pub fn notifications(&self) -> Vec<(String, Vec<Value>)> {
        self.notifications.lock().unwrap().clone()
    }

    /// Requests delivered so far
    pub fn requests(&self) -> Vec<(String, Vec<Value>)> {
        self.requests.lock().unwrap().clone()
    }

    fn script(&self, method: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(method.to_string(), script);
    }
}

impl Default for RecordingEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalEndpoint for RecordingEndpoint {
    async fn notify(&self, method: &str, params: Vec<Value>) -> Result<(), HandlerError> {
        self.notifications
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(())
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, HandlerError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let script = self.scripts.lock().unwrap().get(method).cloned();
        match script {
            Some(Script::Respond(value)) => Ok(value),
            Some(Script::Fail(message)) => Err(HandlerError::failure(message)),
            Some(Script::FailError(error)) => Err(HandlerError::Response(error)),
            Some(Script::Hang) => std::future::pending().await,
            None => Ok(Value::Null),
        }
    }
}
