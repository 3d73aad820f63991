//! Error types for stock-relay operations

use thiserror::Error;

/// Result type alias for stock-relay
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while bootstrapping, registering or launching
#[derive(Error, Debug)]
pub enum RelayError {
    /// A required executable could not be resolved on PATH
    #[error("`{binary}` not found on PATH. Install it first: {hint}")]
    MissingBinary { binary: String, hint: String },

    /// An external command could not be started
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully
    #[error("`{program}` failed with exit code {}: {stderr}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tunnel listing has no entry for the configured name
    #[error("No tunnel named '{0}' in the tunnel listing")]
    TunnelNotFound(String),

    /// The tunnel listing produced something that is not a tunnel identifier
    #[error("Invalid tunnel identifier: '{0}'")]
    InvalidTunnelId(String),

    /// A single readiness probe attempt failed
    #[error("Readiness probe failed: {0}")]
    ProbeFailed(String),

    /// The server never became ready
    #[error("Server at {address} not ready after {attempts} attempts")]
    ReadinessTimeout { address: String, attempts: u32 },

    /// The server process exited before the tunnel was launched
    #[error("Server exited before the tunnel was started (exit code {})", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ServerExited { code: Option<i32> },

    /// Illegal lifecycle state transition
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Environment variable error
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// Invalid pattern error
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RelayError {
    /// Build a `CommandFailed` from a program name and captured output
    pub fn command_failed(program: impl Into<String>, code: Option<i32>, stderr: &str) -> Self {
        Self::CommandFailed {
            program: program.into(),
            code,
            stderr: stderr.trim().to_string(),
        }
    }
}
