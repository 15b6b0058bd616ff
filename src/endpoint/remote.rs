//! Remote endpoint core
//!
//! Implements the bidirectional JSON-RPC runtime: inbound dispatch to the
//! local endpoint, outbound request correlation, the `$/cancelRequest`
//! bridge in both directions, and error shaping under partial failure.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::error::{EndpointError, HandlerError, TransportError};
use crate::endpoint::traits::{LocalEndpoint, MessageConsumer};
use crate::protocol::codec::{JsonCodec, JsonRpcMethod, MessageIssueError};
use crate::protocol::message::{
    CANCEL_METHOD, CancelParams, JsonParams, Message, MessageId, ResponseError, ResponseErrorCode,
};

// ============================================================================
// Error Shaping
// ============================================================================

/// Maps a handler failure to the error object sent on the wire
pub type ExceptionHandler = Box<dyn Fn(&HandlerError) -> ResponseError + Send + Sync>;

/// Default error shaping
///
/// A `HandlerError::Response` is used verbatim; a missing handler becomes
/// `MethodNotFound`; everything else becomes an internal error carrying the
/// stringified failure as data. Inbound dispatch renders cancellations
/// itself, with the request id and method in the message, so the
/// `Cancelled` arm only serves direct callers of this function.
pub fn default_exception_handler(error: &HandlerError) -> ResponseError {
    match error {
        HandlerError::Response(error) => error.clone(),
        HandlerError::MethodNotFound(method) => ResponseError::new(
            ResponseErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        ),
        // Not reachable from handle_request, which intercepts Cancelled
        // before shaping to include the request id and method
        HandlerError::Cancelled => {
            ResponseError::new(ResponseErrorCode::RequestCancelled, "Request was cancelled")
        }
        HandlerError::Failure(failure) => {
            ResponseError::new(ResponseErrorCode::InternalError, "Internal error.")
                .with_data(Value::String(failure.to_string()))
        }
    }
}

// ============================================================================
// Endpoint State
// ============================================================================

/// State kept per outbound request between send and response
struct PendingOutbound {
    /// Method name, used to pick the result type when the response arrives
    method: String,

    /// One-shot completion the caller awaits
    sender: oneshot::Sender<Result<Value, EndpointError>>,

    /// Set once the cancellation path has claimed this entry
    cancelling: bool,
}

/// Unified endpoint state under a single mutex
///
/// The mutex is never held across an await; all operations are O(1) or O(log n)
/// map accesses.
#[derive(Default)]
struct EndpointState {
    /// Pending outbound requests, ordered by id for deterministic shutdown
    outbound_pending: BTreeMap<MessageId, PendingOutbound>,

    /// Cancellation handles of in-flight inbound requests
    inbound_pending: HashMap<MessageId, CancellationToken>,
}

struct Inner {
    /// Outbound request id counter
    next_id: AtomicI64,

    /// Pending maps
    state: Mutex<EndpointState>,

    /// Where outbound messages go
    out: Arc<dyn MessageConsumer>,

    /// Where inbound requests and notifications go
    local: Arc<dyn LocalEndpoint>,

    /// Error shaping for handler failures
    exception_handler: ExceptionHandler,

    /// Method registry and params/result codec
    codec: JsonCodec,
}

// ============================================================================
// Remote Endpoint
// ============================================================================

/// A bidirectional JSON-RPC 2.0 participant
///
/// Cheap to clone; clones share the same pending state and transport.
#[derive(Clone)]
pub struct RemoteEndpoint {
    inner: Arc<Inner>,
}

impl RemoteEndpoint {
    /// Create an endpoint with default error shaping
    pub fn new(
        out: Arc<dyn MessageConsumer>,
        local: Arc<dyn LocalEndpoint>,
        methods: impl IntoIterator<Item = JsonRpcMethod>,
    ) -> Self {
        Self::with_exception_handler(out, local, methods, Box::new(default_exception_handler))
    }

    /// Create an endpoint with custom error shaping for handler failures
    pub fn with_exception_handler(
        out: Arc<dyn MessageConsumer>,
        local: Arc<dyn LocalEndpoint>,
        methods: impl IntoIterator<Item = JsonRpcMethod>,
        exception_handler: ExceptionHandler,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicI64::new(1),
                state: Mutex::new(EndpointState::default()),
                out,
                local,
                exception_handler,
                codec: JsonCodec::new(methods),
            }),
        }
    }

    /// Send a request to the peer
    ///
    /// Returns a [`PendingResponse`] future resolving with the decoded
    /// result. Cancelling it, explicitly or by dropping it unresolved,
    /// notifies the peer with `$/cancelRequest`.
    pub async fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<PendingResponse, EndpointError> {
        let descriptor = self.resolve(method)?;
        let params = self.inner.codec.serialize_params(&descriptor, params)?;

        let id = MessageId::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.outbound_pending.insert(
                id.clone(),
                PendingOutbound {
                    method: method.to_string(),
                    sender,
                    cancelling: false,
                },
            );
        }

        let message = Message::Request {
            id: id.clone(),
            method: method.to_string(),
            params: Some(params),
        };
        if let Err(error) = self.inner.out.consume(message).await {
            let mut state = self.inner.state.lock().unwrap();
            state.outbound_pending.remove(&id);
            return Err(EndpointError::Transport(error));
        }

        Ok(PendingResponse {
            inner: Arc::clone(&self.inner),
            id,
            receiver,
            finished: false,
        })
    }

    /// Send a notification to the peer
    ///
    /// Transport failures are logged and swallowed; there is no caller to
    /// report them to.
    pub async fn notify(&self, method: &str, params: Vec<Value>) -> Result<(), EndpointError> {
        let descriptor = self.resolve(method)?;
        let params = self.inner.codec.serialize_params(&descriptor, params)?;

        let message = Message::Notification {
            method: method.to_string(),
            params: Some(params),
        };
        if let Err(error) = self.inner.out.consume(message).await {
            warn!("Error while processing the message: {error}");
        }
        Ok(())
    }

    /// Dispatch one inbound message
    ///
    /// Never fails: every inbound problem is translated into a response or a
    /// log entry so the read loop keeps going.
    pub async fn consume(&self, message: Message) {
        match message {
            Message::Notification { method, params } => {
                self.handle_notification(method, params).await;
            }
            Message::Request { id, method, params } => {
                self.handle_request(id, method, params).await;
            }
            Message::Response { id, result } => self.handle_response(id, result),
            Message::ErrorResponse { id, error } => self.handle_error_response(id, error),
        }
    }

    /// Report a payload that could not be parsed as a message
    ///
    /// Emits an error response with a null id, as required for requests whose
    /// id could not be recovered.
    pub async fn report_issue(&self, issue: MessageIssueError) {
        let code = issue
            .issues
            .first()
            .map(|issue| issue.code)
            .unwrap_or(ResponseErrorCode::ParseError.code());
        let error = ResponseError {
            code,
            message: issue.to_string(),
            data: issue.payload.clone(),
        };
        self.emit(Message::error_response(None, error)).await;
    }

    /// Fail every pending outbound request with a transport error
    ///
    /// Called on shutdown; entries are failed in id order and the map is
    /// left empty.
    pub fn fail_pending_requests(&self, error: &TransportError) {
        let pending = {
            let mut state = self.inner.state.lock().unwrap();
            std::mem::take(&mut state.outbound_pending)
        };
        for (id, entry) in pending {
            debug!("Failing pending request {id} after transport shutdown");
            let _ = entry.sender.send(Err(EndpointError::Transport(error.clone())));
        }
    }

    fn resolve(&self, method: &str) -> Result<JsonRpcMethod, EndpointError> {
        self.inner.codec.resolve(method).cloned().ok_or_else(|| {
            EndpointError::Codec(MessageIssueError::new(
                format!("no method registered under '{method}'"),
                ResponseErrorCode::MethodNotFound,
            ))
        })
    }

    /// Emit a message, logging transport failures instead of propagating them
    async fn emit(&self, message: Message) {
        if let Err(error) = self.inner.out.consume(message).await {
            warn!("Error while processing the message: {error}");
        }
    }

    // ------------------------------------------------------------------------
    // Inbound notifications
    // ------------------------------------------------------------------------

    async fn handle_notification(&self, method: String, params: Option<JsonParams>) {
        // The cancel notification is consumed here, never dispatched
        if method == CANCEL_METHOD {
            self.handle_cancel_notification(params);
            return;
        }

        let Some(descriptor) = self.inner.codec.resolve(&method).cloned() else {
            if method.starts_with("$/") {
                info!("Ignoring optional notification '{method}'");
            } else {
                warn!("Method not found: '{method}'");
            }
            return;
        };

        let arguments = match self.inner.codec.deserialize_params(&descriptor, params.as_ref()) {
            Ok(arguments) => arguments,
            Err(issue) => {
                warn!("Invalid params for notification '{method}': {issue}");
                return;
            }
        };

        if let Err(error) = self.inner.local.notify(&method, arguments).await {
            warn!("Notification handler for '{method}' failed: {error}");
        }
    }

    fn handle_cancel_notification(&self, params: Option<JsonParams>) {
        let params = match params {
            Some(params) => params.into_value(),
            None => {
                warn!("Received {CANCEL_METHOD} without params");
                return;
            }
        };
        let cancel: CancelParams = match serde_json::from_value(params) {
            Ok(cancel) => cancel,
            Err(error) => {
                warn!("Malformed {CANCEL_METHOD} params: {error}");
                return;
            }
        };

        let state = self.inner.state.lock().unwrap();
        match state.inbound_pending.get(&cancel.id) {
            Some(token) => {
                debug!("Cancelling inbound request {}", cancel.id);
                token.cancel();
            }
            // Unknown or already completed; nothing to do
            None => debug!("Ignoring {CANCEL_METHOD} for unknown request {}", cancel.id),
        }
    }

    // ------------------------------------------------------------------------
    // Inbound requests
    // ------------------------------------------------------------------------

    async fn handle_request(&self, id: MessageId, method: String, params: Option<JsonParams>) {
        let Some(descriptor) = self.inner.codec.resolve(&method).cloned() else {
            if method.starts_with("$/") {
                info!("Replying with null result to optional request '{method}'");
                self.emit(Message::response(id, Value::Null)).await;
            } else {
                self.emit(Message::error_response(
                    Some(id),
                    ResponseError::new(
                        ResponseErrorCode::MethodNotFound,
                        format!("Method not found: {method}"),
                    ),
                ))
                .await;
            }
            return;
        };

        let token = CancellationToken::new();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.inbound_pending.insert(id.clone(), token.clone());
        }

        let arguments = match self.inner.codec.deserialize_params(&descriptor, params.as_ref()) {
            Ok(arguments) => arguments,
            Err(issue) => {
                {
                    let mut state = self.inner.state.lock().unwrap();
                    state.inbound_pending.remove(&id);
                }
                self.emit(Message::error_response(
                    Some(id),
                    ResponseError::new(ResponseErrorCode::InvalidParams, issue.to_string()),
                ))
                .await;
                return;
            }
        };

        // Each request runs on its own task so concurrent requests and a
        // later $/cancelRequest can interleave with the read loop
        let endpoint = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(HandlerError::Cancelled),
                outcome = endpoint.inner.local.request(&method, arguments) => outcome,
            };

            {
                let mut state = endpoint.inner.state.lock().unwrap();
                state.inbound_pending.remove(&id);
            }

            let message = match outcome {
                Ok(value) => match endpoint.inner.codec.serialize_result(&descriptor, value) {
                    Ok(result) => Message::response(id, result),
                    Err(issue) => Message::error_response(
                        Some(id),
                        (endpoint.inner.exception_handler)(&HandlerError::Failure(Box::new(
                            issue,
                        ))),
                    ),
                },
                Err(HandlerError::Cancelled) => Message::error_response(
                    Some(id.clone()),
                    ResponseError::new(
                        ResponseErrorCode::RequestCancelled,
                        format!("The request (id: {id}, method: '{method}') has been cancelled"),
                    ),
                ),
                Err(error) => Message::error_response(
                    Some(id),
                    (endpoint.inner.exception_handler)(&error),
                ),
            };
            endpoint.emit(message).await;
        });
    }

    // ------------------------------------------------------------------------
    // Inbound responses
    // ------------------------------------------------------------------------

    fn handle_response(&self, id: MessageId, result: Value) {
        let Some(entry) = self.take_pending(&id) else {
            return;
        };

        let outcome = match self.inner.codec.resolve(&entry.method) {
            Some(descriptor) => self
                .inner
                .codec
                .deserialize_result(descriptor, result)
                .map_err(EndpointError::Codec),
            None => Err(EndpointError::Codec(MessageIssueError::new(
                format!("no method registered under '{}'", entry.method),
                ResponseErrorCode::MethodNotFound,
            ))),
        };
        let _ = entry.sender.send(outcome);
    }

    fn handle_error_response(&self, id: Option<MessageId>, error: ResponseError) {
        let Some(id) = id else {
            warn!("Peer reported an uncorrelated error: {error}");
            return;
        };
        if let Some(entry) = self.take_pending(&id) {
            let _ = entry.sender.send(Err(EndpointError::Response(error)));
        }
    }

    /// Claim the pending entry for a response, unless cancellation owns it
    fn take_pending(&self, id: &MessageId) -> Option<PendingOutbound> {
        let mut state = self.inner.state.lock().unwrap();
        match state.outbound_pending.get(id) {
            Some(entry) if entry.cancelling => {
                warn!("Dropping late response for cancelled request {id}");
                None
            }
            Some(_) => state.outbound_pending.remove(id),
            None => {
                warn!("Received response for unknown request {id}");
                None
            }
        }
    }
}

impl Inner {
    /// Claim an outbound entry for cancellation; true when this caller won
    fn begin_cancel(&self, id: &MessageId) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.outbound_pending.get_mut(id) {
            Some(entry) if !entry.cancelling => {
                entry.cancelling = true;
                true
            }
            _ => false,
        }
    }

    /// Discard a claimed entry and fail its caller
    fn finish_cancel(&self, id: &MessageId) {
        let entry = {
            let mut state = self.state.lock().unwrap();
            state.outbound_pending.remove(id)
        };
        if let Some(entry) = entry {
            let _ = entry.sender.send(Err(EndpointError::Cancelled));
        }
    }
}

// ============================================================================
// Pending Response
// ============================================================================

/// Future resolving with the result of an outbound request
///
/// Dropping it before resolution cancels the request: the peer is notified
/// with `$/cancelRequest` and the pending entry is discarded.
pub struct PendingResponse {
    inner: Arc<Inner>,
    id: MessageId,
    receiver: oneshot::Receiver<Result<Value, EndpointError>>,
    finished: bool,
}

impl PendingResponse {
    /// Id the request was sent with
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Cancel the request
    ///
    /// Emits `$/cancelRequest` once, strictly after the original request,
    /// then fails the future with [`EndpointError::Cancelled`]. Does nothing
    /// when the response has already arrived.
    pub async fn cancel(&mut self) {
        if self.finished || !self.inner.begin_cancel(&self.id) {
            return;
        }
        if let Err(error) = self
            .inner
            .out
            .consume(Message::cancel_notification(self.id.clone()))
            .await
        {
            warn!("Error while processing the message: {error}");
        }
        self.inner.finish_cancel(&self.id);
    }
}

impl Future for PendingResponse {
    type Output = Result<Value, EndpointError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                this.finished = true;
                Poll::Ready(outcome)
            }
            Poll::Ready(Err(_)) => {
                this.finished = true;
                Poll::Ready(Err(EndpointError::Cancelled))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.finished || !self.inner.begin_cancel(&self.id) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) =
                        inner.out.consume(Message::cancel_notification(id.clone())).await
                    {
                        warn!("Error while processing the message: {error}");
                    }
                    inner.finish_cancel(&id);
                });
            }
            // No runtime left to notify the peer on; just discard the entry
            Err(_) => inner.finish_cancel(&id),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
