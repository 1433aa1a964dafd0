//! Sends encoded operations through the transport and decodes the replies.
//!
//! Three calling conventions share one encode/decode core:
//!
//! - [`Dispatcher::call_map`] blocks the calling thread until the reply arrives
//! - [`Dispatcher::call_map_with`] returns at once and completes a [`Continuation`]
//! - [`Dispatcher::call_async`] returns a future backed by the continuation path
//!
//! Continuations run on the transport's completion thread, never on the
//! caller's. They may run concurrently with each other and with event
//! handlers, and replies to concurrent calls may complete in any order.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::decoder::decode;
use crate::encoder::{encode, Operation};
use crate::error::{RomError, TransportError};
use crate::transport::Transport;

/// Caller-supplied completion for one non-blocking call.
///
/// Exactly one of the success or error paths runs, once, on the transport's
/// reader thread. A blocking call on the same client from inside a
/// continuation stalls that reader until the request times out; chain
/// further work with the `_with` or `_async` calls instead. A panic is
/// logged and does not affect other requests.
pub struct Continuation<T> {
    complete: Box<dyn FnOnce(Result<T, RomError>) + Send + 'static>,
}

impl<T: 'static> Continuation<T> {
    /// Build from separate success and error callbacks.
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(RomError) + Send + 'static,
    {
        Self::from_fn(move |result| match result {
            Ok(value) => on_success(value),
            Err(err) => on_error(err),
        })
    }

    /// Build from a single callback receiving the outcome.
    pub fn from_fn<F>(complete: F) -> Self
    where
        F: FnOnce(Result<T, RomError>) + Send + 'static,
    {
        Self {
            complete: Box::new(complete),
        }
    }

    pub fn on_success(self, value: T) {
        (self.complete)(Ok(value))
    }

    pub fn on_error(self, err: RomError) {
        (self.complete)(Err(err))
    }

    pub(crate) fn complete(self, result: Result<T, RomError>) {
        (self.complete)(result)
    }
}

impl<T> std::fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation").finish_non_exhaustive()
    }
}

/// Encode, send, decode.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Blocking call returning the decoded reply.
    pub fn call(&self, op: &Operation) -> Result<Option<Value>, RomError> {
        self.call_map(op, Ok)
    }

    /// Blocking call with a post-decode extraction step.
    pub fn call_map<R, F>(&self, op: &Operation, extract: F) -> Result<R, RomError>
    where
        F: FnOnce(Option<Value>) -> Result<R, RomError>,
    {
        let request = encode(op);
        debug!("Dispatching {} (blocking)", request.method);
        let raw = self
            .transport
            .send_request(request.method, Value::Object(request.params))?;
        finish(op, &raw, extract)
    }

    /// Non-blocking call completing `cont` with the decoded reply.
    pub fn call_with(&self, op: &Operation, cont: Continuation<Option<Value>>) {
        self.call_map_with(op, Ok, cont)
    }

    /// Non-blocking call with a post-decode extraction step.
    ///
    /// Decode and extraction failures go to `cont`, never to the caller.
    pub fn call_map_with<R, F>(&self, op: &Operation, extract: F, cont: Continuation<R>)
    where
        R: 'static,
        F: FnOnce(Option<Value>) -> Result<R, RomError> + Send + 'static,
    {
        let request = encode(op);
        debug!("Dispatching {} (continuation)", request.method);
        let op = op.clone();
        self.transport.send_request_with(
            request.method,
            Value::Object(request.params),
            Box::new(move |reply| {
                let result = reply
                    .map_err(RomError::from)
                    .and_then(|raw| finish(&op, &raw, extract));
                cont.complete(result);
            }),
        );
    }

    /// Future-returning call.
    ///
    /// The request is sent immediately, not on first poll.
    pub fn call_async<R, F>(
        &self,
        op: &Operation,
        extract: F,
    ) -> impl Future<Output = Result<R, RomError>> + Send + 'static
    where
        R: Send + 'static,
        F: FnOnce(Option<Value>) -> Result<R, RomError> + Send + 'static,
    {
        let (cont, fut) = continuation_pair();
        self.call_map_with(op, extract, cont);
        fut
    }
}

/// A continuation paired with a future that resolves when it completes.
pub(crate) fn continuation_pair<R>() -> (
    Continuation<R>,
    impl Future<Output = Result<R, RomError>> + Send + 'static,
)
where
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let cont = Continuation::from_fn(move |result| {
        let _ = tx.send(result);
    });
    let fut = async move {
        rx.await
            .unwrap_or(Err(RomError::Transport(TransportError::Disconnected)))
    };
    (cont, fut)
}

fn finish<R, F>(op: &Operation, raw: &Value, extract: F) -> Result<R, RomError>
where
    F: FnOnce(Option<Value>) -> Result<R, RomError>,
{
    let decoded = decode(raw, &op.result_type()).map_err(|e| {
        warn!("Failed to decode reply to {}: {}", op.method(), e);
        RomError::Decode(e)
    })?;
    extract(decoded)
}
