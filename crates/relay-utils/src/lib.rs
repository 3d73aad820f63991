//! Shared utilities for stock-relay
//!
//! Currently this is the logging setup used by the `stock-relay` binary.

pub mod logging;

pub use logging::{LogOptions, init_tracing};
