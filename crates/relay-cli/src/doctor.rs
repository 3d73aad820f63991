//! Read-only troubleshooting checks

use comfy_table::{Table, presets};
use relay_core::RelayConfig;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Worth knowing, not a broken setup
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("ok"),
            Self::Warn => f.write_str("warn"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub checks: Vec<Check>,
}

impl DoctorReport {
    pub fn failures(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .count()
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_header(vec!["Check", "Status", "Detail"]);
        for check in &self.checks {
            table.add_row(vec![
                check.name.to_string(),
                check.status.to_string(),
                check.detail.clone(),
            ]);
        }
        table
    }
}

/// Run every check; nothing on disk or remote is modified
pub async fn diagnose(config: &RelayConfig) -> DoctorReport {
    let probe_timeout = config.launch.readiness.timeout();

    DoctorReport {
        checks: vec![
            check_binary(&config.tunnel.binary),
            check_path("environment", &config.environment.dir, true),
            check_path("manifest", &config.environment.manifest, false),
            check_tunnel_config(&config.tunnel.config_file, &config.tunnel.name),
            check_server(&config.server.host, config.server.port, probe_timeout).await,
        ],
    }
}

fn check_binary(binary: &str) -> Check {
    match which::which(binary) {
        Ok(path) => Check::new("cloudflared", CheckStatus::Pass, path.display().to_string()),
        Err(_) => Check::new(
            "cloudflared",
            CheckStatus::Fail,
            format!("'{binary}' not found on PATH, see {}", relay_tunnel::INSTALL_HINT),
        ),
    }
}

fn check_path(name: &'static str, path: &Path, dir: bool) -> Check {
    let found = if dir { path.is_dir() } else { path.is_file() };
    if found {
        Check::new(name, CheckStatus::Pass, path.display().to_string())
    } else {
        Check::new(
            name,
            CheckStatus::Fail,
            format!("{} missing, run `stock-relay bootstrap`", path.display()),
        )
    }
}

fn check_tunnel_config(path: &Path, name: &str) -> Check {
    const CHECK: &str = "tunnel config";

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            return Check::new(
                CHECK,
                CheckStatus::Fail,
                format!("{} missing, run `stock-relay register`", path.display()),
            );
        }
    };

    if content.contains(name) {
        Check::new(
            CHECK,
            CheckStatus::Fail,
            format!(
                "{} still references '{name}' instead of a tunnel id, run `stock-relay register`",
                path.display()
            ),
        )
    } else {
        Check::new(CHECK, CheckStatus::Pass, path.display().to_string())
    }
}

async fn check_server(host: &str, port: u16, timeout: Duration) -> Check {
    const CHECK: &str = "server";

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Check::new(CHECK, CheckStatus::Pass, format!("listening on {host}:{port}")),
        _ => Check::new(
            CHECK,
            CheckStatus::Warn,
            format!("nothing listening on {host}:{port}, start it with `stock-relay run`"),
        ),
    }
}
