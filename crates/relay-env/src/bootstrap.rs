//! Environment bootstrapper
//!
//! Guarantees that the isolated environment exists and that every package in
//! the manifest is installed into it. Creation steps are idempotent; the
//! install step always runs.

use crate::manifest::ensure_manifest;
use relay_core::{CommandRunner, EnvironmentConfig, Invocation, RelayError, Result, Variant};
use std::sync::Arc;
use tracing::{debug, info};

/// What a bootstrap run changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub variant: Variant,
    pub environment_created: bool,
    pub manifest_written: bool,
}

/// Prepares the server's dependency environment
pub struct Bootstrapper {
    config: EnvironmentConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Bootstrapper {
    pub fn new(config: EnvironmentConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Run the full bootstrap: environment, manifest, install
    ///
    /// Install failure aborts with [`RelayError::CommandFailed`].
    pub async fn run(&self) -> Result<BootstrapReport> {
        info!("Bootstrapping {} environment in {}", self.config.variant, self.config.dir.display());

        let environment_created = self.ensure_environment().await?;
        let manifest_written = ensure_manifest(&self.config.manifest, &self.config.packages)?;
        self.install().await?;

        Ok(BootstrapReport {
            variant: self.config.variant,
            environment_created,
            manifest_written,
        })
    }

    /// Create the environment directory if it is absent
    ///
    /// Returns `true` when it was created.
    pub async fn ensure_environment(&self) -> Result<bool> {
        let dir = &self.config.dir;

        if dir.is_dir() {
            debug!("Environment {} already exists", dir.display());
            return Ok(false);
        }

        if dir.exists() {
            return Err(RelayError::ConfigError(format!(
                "{} exists but is not a directory",
                dir.display()
            )));
        }

        let invocation = self.create_invocation();
        info!("Creating environment: {}", invocation);
        self.runner
            .run(&invocation)
            .await?
            .check(&invocation.program)?;

        Ok(true)
    }

    /// Install the manifest into the environment
    pub async fn install(&self) -> Result<()> {
        let invocation = self.install_invocation();
        info!("Installing dependencies: {}", invocation);
        self.runner
            .run(&invocation)
            .await?
            .check(&invocation.program)?;
        Ok(())
    }

    /// Command that creates the environment
    pub fn create_invocation(&self) -> Invocation {
        let dir = self.config.dir.to_string_lossy().into_owned();
        match self.config.variant {
            Variant::Venv => Invocation::new(&self.config.python).args(["-m", "venv"]).arg(dir),
            Variant::Uv => Invocation::new(&self.config.uv).arg("venv").arg(dir),
        }
    }

    /// Command that installs the manifest
    pub fn install_invocation(&self) -> Invocation {
        let manifest = self.config.manifest.to_string_lossy().into_owned();
        match self.config.variant {
            Variant::Venv => {
                Invocation::new(self.config.bin("pip").to_string_lossy().into_owned())
                    .args(["install", "-r"])
                    .arg(manifest)
                    .inherit()
            }
            Variant::Uv => Invocation::new(&self.config.uv)
                .args(["pip", "install", "--python"])
                .arg(self.config.dir.to_string_lossy().into_owned())
                .arg("-r")
                .arg(manifest)
                .inherit(),
        }
    }
}
