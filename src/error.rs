//! Error types for the ROM client.
//!
//! Three families reach the caller: transport failures, decode failures
//! (the reply did not match the declared result type) and protocol failures
//! (a server push was malformed). None of them is retried here.

use thiserror::Error;

/// Errors surfaced by [`RomClient`](crate::RomClient) calls and continuations.
#[derive(Debug, Error)]
pub enum RomError {
    /// The request could not be delivered or its reply could not be read.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The reply did not match the declared result type.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A server push was missing a required field.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Closing the underlying connection failed during `destroy()`.
    #[error("Failed to close connection: {0}")]
    Close(#[source] TransportError),

    /// The client was already destroyed.
    #[error("Client has been destroyed")]
    Destroyed,
}

impl RomError {
    /// Short name of the error family, stable across messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RomError::Transport(_) => "transport",
            RomError::Decode(_) => "decode",
            RomError::Protocol(_) => "protocol",
            RomError::Close(_) => "close",
            RomError::Destroyed => "destroyed",
        }
    }
}

/// Failures reaching or reading from the remote side.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to connect to the server socket.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Framing or JSON encoding problem on the wire.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Server returned a JSON-RPC error response.
    #[error("Server error {code}: {message}")]
    Server {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
        /// Optional additional data
        data: Option<serde_json::Value>,
    },

    /// Blocking request timed out waiting for its reply.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The connection closed before the reply arrived.
    #[error("Connection closed")]
    Disconnected,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                TransportError::ConnectionFailed(err)
            }
            _ => TransportError::Io(err),
        }
    }
}

/// The wire value does not have the shape the caller declared.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Json array '{value}' cannot be converted to {target}")]
    ArrayToScalar { value: String, target: String },

    #[error("Json object {value} cannot be converted to {target} without a 'value' property")]
    MissingValue { value: String, target: String },

    #[error("Json value {value} cannot be converted to {target}")]
    KindMismatch { value: String, target: String },

    #[error(
        "Error format in response to subscription operation. \
         The response should have one property and it has {fields}. The response is: {value}"
    )]
    BadSubscription { fields: usize, value: String },

    #[error("Reply to '{operation}' carried no value")]
    MissingResult { operation: &'static str },

    #[error("Failed to deserialize result: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Convenience alias used across the crate.
pub type Result<T, E = RomError> = std::result::Result<T, E>;
