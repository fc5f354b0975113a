use std::sync::Arc;
use std::time::Duration;

/// Errors that can occur when driving an ACP agent.
///
/// Errors are organized by category:
/// - Configuration errors: detected when a config is built or validated
/// - Spawn errors: failed to start the agent process
/// - IO errors: communication failures with the subprocess
/// - Protocol errors: malformed output or agent-reported RPC failures
/// - Runtime errors: failures during an active session or turn
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors
    // -------------------------------------------------------------------------
    /// Invalid configuration value. The message is path-qualified
    /// (e.g. `args[1]: expected a string`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// Agent binary not found in PATH.
    #[error("agent command not found (searched: {searched})")]
    AgentNotFound { searched: String },

    /// Failed to spawn the agent subprocess.
    #[error("failed to spawn agent process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // IO errors
    // -------------------------------------------------------------------------
    /// IO error communicating with the agent subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol errors
    // -------------------------------------------------------------------------
    /// Failed to parse JSON from agent output.
    #[error("failed to parse JSON: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The agent answered one of our requests with a JSON-RPC error.
    #[error("agent returned an error: {message}")]
    Rpc { message: String },

    // -------------------------------------------------------------------------
    // Runtime errors
    // -------------------------------------------------------------------------
    /// A control-plane request exceeded its deadline.
    #[error("request `{method}` timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The agent process exited while requests were outstanding.
    #[error("agent process exited")]
    ProcessExited,

    /// A turn was started against a session that does not exist.
    #[error("turn failed: {message}")]
    TurnFailed { message: String },

    /// Failure observed through a deduplicated initialization that is
    /// shared between concurrent `ensure_session` callers.
    #[error(transparent)]
    Shared(Arc<Error>),
}

/// A specialized Result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a JSON parse error with context from the offending line.
    pub fn json_parse(source: serde_json::Error, raw: &str) -> Self {
        Self::JsonParse {
            message: format!(
                "at position {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Create an RPC error from an agent-supplied error payload.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Host-facing error code, when the error kind carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::TurnFailed { .. } => Some("ACP_TURN_FAILED"),
            Error::Shared(inner) => inner.code(),
            _ => None,
        }
    }

    /// Check whether this error was caused by the agent process exiting.
    pub fn is_process_exit(&self) -> bool {
        match self {
            Error::ProcessExited => true,
            Error::Shared(inner) => inner.is_process_exit(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse {
            message: err.to_string(),
            source: err,
        }
    }
}
