//! JSON-RPC 2.0 transport over a Unix domain socket.
//!
//! One reader thread owns the read half of the socket. It completes pending
//! reply callbacks by request id and hands server-initiated requests to the
//! registered push handler. Writers share the write half behind a mutex.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::framing::{read_message, write_message};
use super::{PushHandler, PushMessage, ReplyCallback, Transport};
use crate::config::ClientConfig;
use crate::error::TransportError;

/// JSON-RPC client transport over a Unix socket.
///
/// # Example
///
/// ```ignore
/// use rom_client::{ClientConfig, SocketTransport, Transport};
/// use serde_json::json;
///
/// let transport = SocketTransport::connect(&ClientConfig::from_env())?;
/// let reply = transport.send_request("create", json!({"type": "MediaPipeline"}))?;
/// ```
pub struct SocketTransport {
    shared: Arc<Shared>,
    /// Monotonically increasing request ID counter.
    next_id: AtomicU64,
    /// Timeout for blocking requests.
    timeout: Duration,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// State shared with the reader thread.
struct Shared {
    writer: Mutex<UnixStream>,
    pending: Mutex<HashMap<u64, ReplyCallback>>,
    push_handler: RwLock<Option<PushHandler>>,
    disconnected: AtomicBool,
}

impl SocketTransport {
    /// Connect to the server socket named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if the socket does not
    /// exist or the connection is refused.
    pub fn connect(config: &ClientConfig) -> Result<Self, TransportError> {
        info!("Connecting to ROM server at {}", config.socket_path.display());
        let stream =
            UnixStream::connect(&config.socket_path).map_err(TransportError::ConnectionFailed)?;
        Self::from_stream(stream, config.request_timeout)
    }

    /// Wrap an already connected stream and start the reader thread.
    pub fn from_stream(stream: UnixStream, timeout: Duration) -> Result<Self, TransportError> {
        let read_half = stream.try_clone()?;

        let shared = Arc::new(Shared {
            writer: Mutex::new(stream),
            pending: Mutex::new(HashMap::new()),
            push_handler: RwLock::new(None),
            disconnected: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        let reader_handle = thread::Builder::new()
            .name("rom-transport".into())
            .spawn(move || reader_thread(read_half, reader_shared))?;

        Ok(Self {
            shared,
            next_id: AtomicU64::new(1),
            timeout,
            reader_handle: Mutex::new(Some(reader_handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    /// False once the peer hung up or `close()` was called.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.shared.disconnected.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `on_reply`, write the request, and return its id.
    ///
    /// Returns `None` when the callback was already completed with an error.
    fn dispatch(&self, method: &str, params: Value, on_reply: ReplyCallback) -> Option<u64> {
        if self.closed.load(Ordering::SeqCst) || self.shared.disconnected.load(Ordering::SeqCst) {
            on_reply(Err(TransportError::Disconnected));
            return None;
        }

        let id = self.next_id();
        lock(&self.shared.pending).insert(id, on_reply);

        // The reader may have drained `pending` between the check above and
        // the insert; reclaim our callback in that case.
        if self.shared.disconnected.load(Ordering::SeqCst) {
            if let Some(cb) = self.shared.take_pending(id) {
                cb(Err(TransportError::Disconnected));
            }
            return None;
        }

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("Sending request {} ({})", id, method);
        if let Err(e) = self.shared.write(&request) {
            if let Some(cb) = self.shared.take_pending(id) {
                cb(Err(e));
            }
            return None;
        }

        Some(id)
    }
}

impl Transport for SocketTransport {
    fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let (tx, rx) = mpsc::channel();
        let id = self.dispatch(
            method,
            params,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(id) = id {
                    self.shared.take_pending(id);
                }
                warn!("Request {:?} ({}) timed out", id, method);
                Err(TransportError::Timeout(self.timeout.as_secs()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn send_request_with(&self, method: &str, params: Value, on_reply: ReplyCallback) {
        self.dispatch(method, params, on_reply);
    }

    fn set_push_handler(&self, handler: PushHandler) {
        let mut slot = self
            .shared
            .push_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handler);
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!("Closing ROM transport");
        let shutdown = lock(&self.shared.writer).shutdown(Shutdown::Both);
        match shutdown {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
            Err(e) => return Err(TransportError::Io(e)),
        }

        // Joining from the reader thread itself (a reply callback calling
        // close) would deadlock.
        if let Some(handle) = lock(&self.reader_handle).take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("ROM transport reader thread panicked");
            }
        }

        Ok(())
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing ROM transport on drop: {}", e);
        }
    }
}

impl Shared {
    fn write(&self, message: &Value) -> Result<(), TransportError> {
        let body = serde_json::to_string(message)
            .map_err(|e| TransportError::Framing(format!("Failed to serialize message: {}", e)))?;
        let mut writer = lock(&self.writer);
        write_message(&mut *writer, &body)
            .map_err(|e| TransportError::Framing(format!("Failed to send message: {:#}", e)))
    }

    fn take_pending(&self, id: u64) -> Option<ReplyCallback> {
        lock(&self.pending).remove(&id)
    }

    fn push_handler(&self) -> Option<PushHandler> {
        self.push_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Mark the connection dead and fail every outstanding request.
    fn fail_all(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        let drained: Vec<(u64, ReplyCallback)> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            warn!("Failing {} pending requests after disconnect", drained.len());
        }
        for (id, cb) in drained {
            complete(id, cb, Err(TransportError::Disconnected));
        }
    }
}

/// Reader thread that processes server output until EOF or a read error.
fn reader_thread(stream: UnixStream, shared: Arc<Shared>) {
    let mut reader = BufReader::new(stream);

    loop {
        let body = match read_message(&mut reader) {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!("ROM server closed the connection");
                break;
            }
            Err(e) => {
                error!("Failed to read ROM message: {:#}", e);
                break;
            }
        };

        match serde_json::from_str::<Value>(&body) {
            Ok(json) => handle_message(&shared, json),
            Err(e) => warn!("Discarding malformed ROM message: {}", e),
        }
    }

    shared.fail_all();
}

/// Handle one parsed message: a server push or a reply.
fn handle_message(shared: &Shared, mut json: Value) {
    if let Some(method) = json.get("method").and_then(|m| m.as_str()).map(str::to_owned) {
        let id = json.get("id").cloned().filter(|id| !id.is_null());
        let params = json.get_mut("params").map(Value::take).unwrap_or(Value::Null);

        match shared.push_handler() {
            Some(handler) => {
                let message = PushMessage::new(method, params);
                if panic::catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                    error!("ROM push handler panicked");
                }
            }
            None => debug!("No push handler registered; dropping '{}'", method),
        }

        if let Some(id) = id {
            let ack = json!({"jsonrpc": "2.0", "id": id, "result": null});
            if let Err(e) = shared.write(&ack) {
                warn!("Failed to acknowledge server request: {}", e);
            }
        }
        return;
    }

    let Some(id) = json.get("id").and_then(|id| id.as_u64()) else {
        warn!("ROM message has neither method nor numeric id: {}", json);
        return;
    };

    let Some(cb) = shared.take_pending(id) else {
        debug!("Reply for unknown or expired request {}", id);
        return;
    };

    if let Some(err) = json.get("error") {
        let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown server error")
            .to_string();
        debug!("Request {} failed: {} (code: {})", id, message, code);
        let err = TransportError::Server {
            code,
            message,
            data: err.get("data").cloned(),
        };
        complete(id, cb, Err(err));
        return;
    }

    let result = json.get_mut("result").map(Value::take).unwrap_or(Value::Null);
    debug!("Request {} completed", id);
    complete(id, cb, Ok(result));
}

/// Run a reply callback on the reader thread.
///
/// A panic is contained to that callback; the reader keeps serving replies.
fn complete(id: u64, cb: ReplyCallback, result: Result<Value, TransportError>) {
    if panic::catch_unwind(AssertUnwindSafe(move || cb(result))).is_err() {
        error!("Reply callback for request {} panicked", id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
