//! Environment bootstrapper for stock-relay
//!
//! Makes sure the analysis server has an isolated dependency environment
//! (a plain virtualenv or one managed by `uv`), writes a default manifest
//! when none exists, and installs the manifest into the environment.
//!
//! # Example
//!
//! ```no_run
//! use relay_core::{RelayConfig, SystemRunner};
//! use relay_env::Bootstrapper;
//! use std::sync::Arc;
//!
//! # async fn example() -> relay_core::Result<()> {
//! let config = RelayConfig::load_merged(None)?;
//! let bootstrapper = Bootstrapper::new(config.environment, Arc::new(SystemRunner));
//! let report = bootstrapper.run().await?;
//! println!("environment created: {}", report.environment_created);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod manifest;

pub use bootstrap::{BootstrapReport, Bootstrapper};
pub use manifest::{ensure_manifest, render_manifest};
