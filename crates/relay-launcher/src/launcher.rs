//! Server-then-tunnel launch sequence

use crate::process::{ManagedProcess, Role};
use crate::readiness::ReadinessProbe;
use crate::state::{LaunchState, StateTracker};
use crate::supervisor::Supervisor;
use relay_core::{Invocation, ReadinessConfig, RelayConfig, RelayError, Result, RetryPolicy, Variant};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything needed to start the two children
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub server: Invocation,
    pub tunnel: Invocation,
    /// Minimum delay between the two spawns
    pub grace_period: Duration,
    pub readiness: ReadinessConfig,
    pub host: String,
    pub port: u16,
    pub local_url: String,
    pub hostname: Option<String>,
    /// Used to stop the server when launch fails halfway
    pub shutdown_grace: Duration,
}

impl LaunchPlan {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            server: server_invocation(config),
            tunnel: tunnel_invocation(config),
            grace_period: config.launch.grace_period(),
            readiness: config.launch.readiness.clone(),
            host: config.server.host.clone(),
            port: config.server.port,
            local_url: config.local_url(),
            hostname: config.tunnel.hostname.clone(),
            shutdown_grace: config.launch.shutdown.grace(),
        }
    }
}

/// Server command for the configured variant
pub fn server_invocation(config: &RelayConfig) -> Invocation {
    let server = &config.server;
    let env = &config.environment;

    let invocation = match env.variant {
        Variant::Venv => Invocation::new(env.bin("python").display().to_string()),
        Variant::Uv => Invocation::new(&env.uv).arg("run"),
    };

    invocation
        .arg(server.script.display().to_string())
        .args(["--transport", server.transport.as_str()])
        .args(["--host", server.host.as_str()])
        .arg("--port")
        .arg(server.port.to_string())
        .args(server.extra_args.iter().cloned())
        .inherit()
}

/// `cloudflared tunnel --config <file> run <name>`
pub fn tunnel_invocation(config: &RelayConfig) -> Invocation {
    let tunnel = &config.tunnel;
    Invocation::new(&tunnel.binary)
        .arg("tunnel")
        .arg("--config")
        .arg(tunnel.config_file.display().to_string())
        .arg("run")
        .arg(&tunnel.name)
        .inherit()
}

/// Starts the server, waits until it is ready, then starts the tunnel
pub struct ProcessLauncher {
    plan: LaunchPlan,
    retry_policy: Option<RetryPolicy>,
}

impl ProcessLauncher {
    pub fn new(plan: LaunchPlan) -> Self {
        Self {
            plan,
            retry_policy: None,
        }
    }

    /// Override the readiness retry policy derived from the plan
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn plan(&self) -> &LaunchPlan {
        &self.plan
    }

    /// Start both children and hand them to a [`Supervisor`]
    ///
    /// If anything fails after the server is spawned, the server is stopped
    /// before the error is returned. Dropping the future mid-launch (Ctrl-C,
    /// a timeout) kills the server's process group instead of orphaning it.
    pub async fn launch(&self) -> Result<Supervisor> {
        let plan = &self.plan;
        let mut state = StateTracker::new();

        state.advance(LaunchState::ServerLaunching)?;
        let mut server = ManagedProcess::spawn(Role::Server, &plan.server)?;
        server.set_kill_on_drop(true);
        state.advance(LaunchState::ServerLaunched)?;

        match self.start_tunnel(&mut server, &mut state).await {
            Ok(tunnel) => {
                server.set_kill_on_drop(false);
                Ok(Supervisor::new(
                    server,
                    tunnel,
                    state,
                    plan.local_url.clone(),
                    plan.hostname.clone(),
                ))
            }
            Err(e) => {
                warn!("Launch failed, stopping server (pid {})", server.pid());
                match server.terminate(plan.shutdown_grace).await {
                    Ok(termination) => {
                        debug!("Server stopped: {:?}", termination);
                        server.set_kill_on_drop(false);
                    }
                    // Still armed, so dropping it kills the group
                    Err(stop_err) => warn!("Failed to stop server: {}", stop_err),
                }
                Err(e)
            }
        }
    }

    /// Everything between the server spawn and the tunnel spawn
    async fn start_tunnel(
        &self,
        server: &mut ManagedProcess,
        state: &mut StateTracker,
    ) -> Result<ManagedProcess> {
        let plan = &self.plan;

        tokio::time::sleep(plan.grace_period).await;
        if let Some(code) = server.try_wait()? {
            return Err(RelayError::ServerExited { code });
        }

        let mut probe = ReadinessProbe::new(&plan.readiness, &plan.host, plan.port)?;
        if let Some(policy) = &self.retry_policy {
            probe = probe.with_retry_policy(policy.clone());
        }

        if let Err(e) = probe.wait_until_ready().await {
            // A server that died while being probed is the more useful error
            if let Some(code) = server.try_wait()? {
                return Err(RelayError::ServerExited { code });
            }
            warn!("Server never became ready");
            return Err(e);
        }
        info!("Server ready at {}", plan.local_url);

        state.advance(LaunchState::TunnelLaunching)?;
        let tunnel = ManagedProcess::spawn(Role::Tunnel, &plan.tunnel)?;
        state.advance(LaunchState::TunnelLaunched)?;
        Ok(tunnel)
    }
}
