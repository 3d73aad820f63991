//! Process launcher and lifecycle supervisor for stock-relay
//!
//! [`ProcessLauncher`] starts the stock-analysis server, waits out the grace
//! period, probes the server until it accepts connections and only then
//! starts the Cloudflare tunnel. The resulting [`Supervisor`] owns both
//! children, waits for an interrupt or a child exit, and applies the
//! configured [`ShutdownPolicy`](relay_core::ShutdownPolicy).
//!
//! # Example
//!
//! ```no_run
//! use relay_core::RelayConfig;
//! use relay_launcher::{LaunchPlan, ProcessLauncher};
//!
//! # async fn example() -> relay_core::Result<()> {
//! let config = RelayConfig::load_merged(None)?;
//! let mut supervisor = ProcessLauncher::new(LaunchPlan::from_config(&config)).launch().await?;
//! println!("{}", supervisor.report(config.launch.shutdown.policy));
//!
//! supervisor
//!     .wait(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! supervisor
//!     .shutdown(config.launch.shutdown.policy, config.launch.shutdown.grace())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod launcher;
pub mod process;
pub mod readiness;
pub mod report;
pub mod state;
pub mod supervisor;

#[cfg(all(test, unix))]
mod test_support;

pub use launcher::{LaunchPlan, ProcessLauncher, server_invocation, tunnel_invocation};
pub use process::{ManagedProcess, Role, Termination};
pub use readiness::ReadinessProbe;
pub use report::{LifecycleReport, ProcessEntry};
pub use state::{LaunchState, StateTracker};
pub use supervisor::{ShutdownSummary, Supervisor, WaitOutcome};
