//! Transport boundary consumed by the ROM client.
//!
//! The client only needs four primitives from a transport: a blocking
//! request, a callback-driven request, a hook for server-initiated messages,
//! and close. Connection setup, framing, reconnection and timeouts are the
//! transport's business.
//!
//! # Threading
//!
//! Reply callbacks and push handlers run on whatever thread the transport
//! chooses, typically its I/O reader thread. They must not assume they run on
//! the thread that issued the request, and must not block on a reply from the
//! same transport while running on its reader thread.
//!
//! Two implementations ship with the crate:
//!
//! - [`SocketTransport`] - JSON-RPC 2.0 over a Unix domain socket
//! - [`MockTransport`] - scripted in-memory transport for tests

mod framing;
pub mod mock;
mod socket;

use std::sync::Arc;

use serde_json::Value;

use crate::error::TransportError;

pub use framing::{read_message, write_message, MAX_MESSAGE_SIZE};
pub use mock::MockTransport;
pub use socket::SocketTransport;

/// Completion callback for one non-blocking request.
pub type ReplyCallback = Box<dyn FnOnce(Result<Value, TransportError>) + Send + 'static>;

/// Receiver for server-initiated messages.
pub type PushHandler = Arc<dyn Fn(PushMessage) + Send + Sync + 'static>;

/// A message the remote side sent outside the request/response cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub method: String,
    pub params: Value,
}

impl PushMessage {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Request/response channel to the remote process.
pub trait Transport: Send + Sync {
    /// Send a request and block until its reply (or failure) arrives.
    ///
    /// An empty reply is returned as `Value::Null`.
    fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Send a request and return immediately; `on_reply` runs exactly once
    /// when the reply or failure arrives.
    fn send_request_with(&self, method: &str, params: Value, on_reply: ReplyCallback);

    /// Replace the handler for server-initiated messages.
    fn set_push_handler(&self, handler: PushHandler);

    /// Release the connection.
    fn close(&self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        (**self).send_request(method, params)
    }

    fn send_request_with(&self, method: &str, params: Value, on_reply: ReplyCallback) {
        (**self).send_request_with(method, params, on_reply)
    }

    fn set_push_handler(&self, handler: PushHandler) {
        (**self).set_push_handler(handler)
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }
}
