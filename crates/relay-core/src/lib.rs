//! Core types for stock-relay
//!
//! This crate holds what every other stock-relay crate shares:
//! - [`RelayConfig`]: the single source of truth for host, port, tunnel name
//!   and file locations
//! - [`RelayError`] and the crate-wide [`Result`] alias
//! - [`RetryPolicy`]: bounded retries with exponential backoff
//! - [`CommandRunner`]: the seam through which external tools are invoked
//!
//! Enable the `testing` feature to get `MockCommandRunner` in downstream tests.

pub mod command;
pub mod config;
pub mod error;
pub mod retry;

pub use command::{CommandOutput, CommandRunner, Invocation, StdioMode, SystemRunner};
#[cfg(any(test, feature = "testing"))]
pub use command::MockCommandRunner;
pub use config::{
    ConfigOverrides, DEFAULT_PACKAGES, EnvironmentConfig, LaunchConfig, ProbeKind,
    ReadinessConfig, RelayConfig, ServerConfig, ShutdownConfig, ShutdownPolicy, TunnelConfig,
    Variant,
};
pub use error::{RelayError, Result};
pub use retry::RetryPolicy;
