//! Locating (and on macOS installing) the tunnel client

use relay_core::{CommandRunner, Invocation, RelayError, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Where to point operators when the tunnel client is missing
pub const INSTALL_HINT: &str =
    "https://developers.cloudflare.com/cloudflare-one/connections/connect-networks/downloads/";

/// Platform family, only macOS installs are automated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }
}

/// Directory holding the tunnel client's login certificate and credentials
pub fn cloudflared_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(|_| PathBuf::from(".cloudflared"), |home| PathBuf::from(home).join(".cloudflared"))
}

/// Resolve `binary` on PATH, installing it with Homebrew on macOS
pub async fn ensure_binary(
    binary: &str,
    platform: Platform,
    runner: &dyn CommandRunner,
) -> Result<PathBuf> {
    if let Ok(path) = which::which(binary) {
        debug!("Found {} at {}", binary, path.display());
        return Ok(path);
    }

    let missing = || RelayError::MissingBinary {
        binary: binary.to_string(),
        hint: INSTALL_HINT.to_string(),
    };

    if platform != Platform::MacOs {
        return Err(missing());
    }

    info!("{} not found, installing with Homebrew", binary);
    let install = Invocation::new("brew").args(["install", binary]).inherit();
    runner.run(&install).await?.check(&install.program)?;

    which::which(binary).map_err(|_| missing())
}
