//! One-time Cloudflare tunnel registration for stock-relay
//!
//! The [`Registrar`] makes sure `cloudflared` is available, logs in, creates
//! the named tunnel, discovers the identifier Cloudflare assigned to it and
//! rewrites the local tunnel configuration to reference that identifier.
//! Binding a DNS hostname stays a manual step; the registrar only prints the
//! command for it.
//!
//! # Example
//!
//! ```no_run
//! use relay_core::{RelayConfig, SystemRunner};
//! use relay_tunnel::Registrar;
//! use std::sync::Arc;
//!
//! # async fn example() -> relay_core::Result<()> {
//! let config = RelayConfig::load_merged(None)?;
//! let registration = Registrar::new(config, Arc::new(SystemRunner)).register().await?;
//! println!("{}", registration.guidance);
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod config_file;
pub mod guidance;
pub mod listing;
pub mod registrar;

pub use binary::{INSTALL_HINT, Platform, cloudflared_dir, ensure_binary};
pub use config_file::{Rewrite, backup_path, ensure_config_file, render_default_config, rewrite_config};
pub use listing::{is_tunnel_id, parse_tunnel_list};
pub use registrar::{Registrar, Registration};
