//! Connection settings for the socket transport.

use std::path::PathBuf;
use std::time::Duration;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "ROM_SOCKET";

/// Environment variable overriding the request timeout (seconds).
pub const TIMEOUT_ENV: &str = "ROM_TIMEOUT_SECS";

/// Settings used by [`SocketTransport::connect`](crate::SocketTransport::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Path to the server's Unix domain socket.
    pub socket_path: PathBuf,
    /// How long a blocking request waits for its reply.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Defaults with `ROM_TIMEOUT_SECS` applied.
    ///
    /// An unparsable timeout is ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.request_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!("Ignoring invalid {}={}", TIMEOUT_ENV, raw),
            }
        }
        config
    }
}

/// Resolve the default socket path for the ROM server.
///
/// Resolution order:
/// 1. `$ROM_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/rom.sock` (Linux standard)
/// 3. `~/Library/Caches/rom.sock` (macOS)
/// 4. `/tmp/rom.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SOCKET_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("rom.sock");
    }

    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("rom.sock");
    }

    PathBuf::from("/tmp/rom.sock")
}
