//! One-time tunnel registration
//!
//! Runs under human supervision: any failed step aborts, and remote
//! resources created before the failure are left in place.

use crate::binary::{Platform, cloudflared_dir, ensure_binary};
use crate::config_file::{ensure_config_file, rewrite_config};
use crate::guidance::{GuidanceContext, render_guidance};
use crate::listing::{find_tunnel_id, parse_tunnel_list, parse_tunnel_list_json};
use relay_core::{CommandRunner, Invocation, RelayConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub tunnel_id: String,
    pub config_file: PathBuf,
    pub backup: PathBuf,
    pub config_created: bool,
    pub replacements: usize,
    /// Instructions for the manual DNS step
    pub guidance: String,
}

/// Registers the configured tunnel and binds the local config file to it
pub struct Registrar {
    config: RelayConfig,
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
    credentials_dir: PathBuf,
    skip_login: bool,
}

impl Registrar {
    pub fn new(config: RelayConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            platform: Platform::current(),
            credentials_dir: cloudflared_dir(),
            skip_login: false,
        }
    }

    /// Skip the interactive login when a login certificate already exists
    pub fn with_skip_login(mut self, skip_login: bool) -> Self {
        self.skip_login = skip_login;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_credentials_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credentials_dir = dir.into();
        self
    }

    fn tunnel(&self) -> Invocation {
        Invocation::new(&self.config.tunnel.binary).arg("tunnel")
    }

    /// Run every registration step in order
    pub async fn register(&self) -> Result<Registration> {
        let tunnel = &self.config.tunnel;

        ensure_binary(&tunnel.binary, self.platform, self.runner.as_ref()).await?;
        self.login().await?;
        self.create().await?;

        // Discover before touching any file so a failed lookup leaves them as they were
        let tunnel_id = self.discover_id().await?;
        info!("Tunnel '{}' has id {}", tunnel.name, tunnel_id);

        let config_created = ensure_config_file(
            &tunnel.config_file,
            &tunnel.name,
            &self.credentials_dir,
            &self.config.local_url(),
            tunnel.hostname.as_deref(),
        )?;
        let rewrite = rewrite_config(&tunnel.config_file, &tunnel.name, &tunnel_id)?;

        let guidance = render_guidance(&GuidanceContext {
            name: &tunnel.name,
            id: &tunnel_id,
            binary: &tunnel.binary,
            config_file: tunnel.config_file.display().to_string(),
            backup: rewrite.backup.display().to_string(),
            replacements: rewrite.replacements,
            hostname: tunnel.hostname.as_deref(),
            local_url: self.config.local_url(),
        })?;

        Ok(Registration {
            tunnel_id,
            config_file: tunnel.config_file.clone(),
            backup: rewrite.backup,
            config_created,
            replacements: rewrite.replacements,
            guidance,
        })
    }

    /// Interactive login; blocks until the browser flow completes
    pub async fn login(&self) -> Result<()> {
        let cert = self.credentials_dir.join("cert.pem");
        if self.skip_login && cert.exists() {
            info!("Skipping login, found {}", cert.display());
            return Ok(());
        }
        if self.skip_login {
            warn!("No login certificate at {}, logging in anyway", cert.display());
        }

        let login = self.tunnel().arg("login").inherit();
        info!("Logging in: {}", login);
        self.runner.run(&login).await?.check(&login.program)?;
        Ok(())
    }

    /// Create the remote tunnel resource
    pub async fn create(&self) -> Result<()> {
        let create = self.tunnel().arg("create").arg(&self.config.tunnel.name);
        info!("Creating tunnel: {}", create);
        let output = self.runner.run(&create).await?.check(&create.program)?;
        debug!("{}", output.stdout.trim());
        Ok(())
    }

    /// Find the identifier assigned to the configured tunnel name
    ///
    /// Tries the JSON listing first and falls back to parsing the text listing.
    pub async fn discover_id(&self) -> Result<String> {
        let name = &self.config.tunnel.name;

        let json_list = self.tunnel().args(["list", "--output", "json"]);
        match self.runner.run(&json_list).await {
            Ok(output) if output.is_success() => {
                if let Some(entries) = parse_tunnel_list_json(&output.stdout) {
                    return find_tunnel_id(&entries, name);
                }
                debug!("JSON tunnel listing did not parse, falling back to text");
            }
            Ok(output) => debug!(
                "JSON tunnel listing unavailable (exit {:?}), falling back to text",
                output.code
            ),
            Err(e) => debug!("JSON tunnel listing failed: {}, falling back to text", e),
        }

        let text_list = self.tunnel().arg("list");
        let output = self.runner.run(&text_list).await?.check(&text_list.program)?;
        parse_tunnel_list(&output.stdout, name)
    }
}
