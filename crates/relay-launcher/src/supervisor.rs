//! Ownership of the running server and tunnel

use crate::process::{ManagedProcess, Role, Termination};
use crate::report::{LifecycleReport, ProcessEntry};
use crate::state::{LaunchState, StateTracker};
use relay_core::{Result, ShutdownPolicy};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Why [`Supervisor::wait`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The shutdown future resolved
    Interrupted,
    /// One of the children exited on its own
    ChildExited { role: Role, code: Option<i32> },
}

/// What [`Supervisor::shutdown`] did to each child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub policy: ShutdownPolicy,
    /// `None` when the child was left running
    pub server: Option<Termination>,
    pub tunnel: Option<Termination>,
}

/// Holds both children after a successful launch
#[derive(Debug)]
pub struct Supervisor {
    server: ManagedProcess,
    tunnel: ManagedProcess,
    state: StateTracker,
    local_url: String,
    hostname: Option<String>,
}

impl Supervisor {
    pub(crate) fn new(
        server: ManagedProcess,
        tunnel: ManagedProcess,
        state: StateTracker,
        local_url: String,
        hostname: Option<String>,
    ) -> Self {
        Self {
            server,
            tunnel,
            state,
            local_url,
            hostname,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state.current()
    }

    pub fn server(&self) -> &ManagedProcess {
        &self.server
    }

    pub fn tunnel(&self) -> &ManagedProcess {
        &self.tunnel
    }

    /// `(server_pid, tunnel_pid)`
    pub fn pids(&self) -> (u32, u32) {
        (self.server.pid(), self.tunnel.pid())
    }

    /// Block until `shutdown` resolves or either child exits
    ///
    /// Returning never stops a child; that is up to [`shutdown`](Self::shutdown).
    pub async fn wait<F>(&mut self, shutdown: F) -> Result<WaitOutcome>
    where
        F: Future<Output = ()>,
    {
        self.state.advance(LaunchState::Waiting)?;

        let outcome = tokio::select! {
            () = shutdown => WaitOutcome::Interrupted,
            code = self.server.wait() => WaitOutcome::ChildExited { role: Role::Server, code: code? },
            code = self.tunnel.wait() => WaitOutcome::ChildExited { role: Role::Tunnel, code: code? },
        };

        match outcome {
            WaitOutcome::Interrupted => {
                info!("Interrupted");
                self.state.advance(LaunchState::Interrupted)?;
            }
            WaitOutcome::ChildExited { role, code } => {
                info!("The {} exited (exit code {:?})", role, code);
                self.state.advance(LaunchState::ChildExited)?;
            }
        }
        Ok(outcome)
    }

    /// Apply the shutdown policy to both children
    ///
    /// With [`ShutdownPolicy::Terminate`] the tunnel is stopped before the
    /// server so no request reaches a dead backend. The server is stopped
    /// even when stopping the tunnel fails; the first error is returned.
    pub async fn shutdown(&mut self, policy: ShutdownPolicy, grace: Duration) -> Result<ShutdownSummary> {
        match policy {
            ShutdownPolicy::Detach => {
                let (server_pid, tunnel_pid) = self.pids();
                info!(
                    "Leaving server (pid {}) and tunnel (pid {}) running",
                    server_pid, tunnel_pid
                );
                Ok(ShutdownSummary {
                    policy,
                    server: None,
                    tunnel: None,
                })
            }
            ShutdownPolicy::Terminate => {
                let tunnel = self.tunnel.terminate(grace).await;
                if let Err(e) = &tunnel {
                    warn!("Failed to stop the tunnel, stopping the server anyway: {}", e);
                }
                let server = self.server.terminate(grace).await;
                let (tunnel, server) = both(tunnel, server)?;
                Ok(ShutdownSummary {
                    policy,
                    server: Some(server),
                    tunnel: Some(tunnel),
                })
            }
        }
    }

    pub fn report(&self, policy: ShutdownPolicy) -> LifecycleReport {
        let entry = |process: &ManagedProcess| ProcessEntry {
            role: process.role(),
            pid: process.pid(),
            command: process.command().to_string(),
        };

        LifecycleReport {
            server: entry(&self.server),
            tunnel: entry(&self.tunnel),
            local_url: self.local_url.clone(),
            hostname: self.hostname.clone(),
            policy,
        }
    }
}

/// Both values, or the first error
fn both<A, B>(first: Result<A>, second: Result<B>) -> Result<(A, B)> {
    match (first, second) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}
