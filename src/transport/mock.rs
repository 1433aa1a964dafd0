//! Scripted in-memory transport.
//!
//! Replies come from a caller-supplied responder. Non-blocking requests
//! complete on a freshly spawned thread, so callers see the same
//! "completion runs elsewhere" behaviour as with a real I/O thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::thread;

use serde_json::Value;
use tracing::debug;

use super::{PushHandler, PushMessage, ReplyCallback, Transport};
use crate::error::TransportError;

type Responder = Box<dyn Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync>;

/// Transport double for tests and for code layered on top of the client.
pub struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<(String, Value)>>,
    push_handler: RwLock<Option<PushHandler>>,
    close_error: Mutex<Option<TransportError>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockTransport {
    /// Answer every request with `responder(method, params)`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            push_handler: RwLock::new(None),
            close_error: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Answer every request with the same value.
    pub fn replying(value: Value) -> Self {
        Self::new(move |_, _| Ok(value.clone()))
    }

    /// Make the first `close()` fail with `err`.
    pub fn failing_close(self, err: TransportError) -> Self {
        *self
            .close_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err);
        self
    }

    /// Every `(method, params)` pair sent so far, in send order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Deliver a server push on the calling thread.
    ///
    /// Returns `false` if no push handler is registered.
    pub fn push(&self, message: PushMessage) -> bool {
        let handler = self
            .push_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }

    /// How many times `close()` was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        let reply = (self.responder)(method, &params);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((method.to_string(), params));
        reply
    }
}

impl Transport for MockTransport {
    fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.respond(method, params)
    }

    fn send_request_with(&self, method: &str, params: Value, on_reply: ReplyCallback) {
        let reply = self.respond(method, params);
        debug!("Mock transport completing '{}' on a worker thread", method);
        thread::spawn(move || on_reply(reply));
    }

    fn set_push_handler(&self, handler: PushHandler) {
        *self
            .push_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        match self
            .close_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
