//! Post-launch report for the operator

use crate::process::Role;
use comfy_table::{ContentArrangement, Table, presets};
use relay_core::ShutdownPolicy;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub role: Role,
    pub pid: u32,
    pub command: String,
}

/// PIDs, commands and how to stop both children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    pub server: ProcessEntry,
    pub tunnel: ProcessEntry,
    pub local_url: String,
    pub hostname: Option<String>,
    pub policy: ShutdownPolicy,
}

impl LifecycleReport {
    /// `kill <server_pid> <tunnel_pid>`
    pub fn kill_command(&self) -> String {
        format!("kill {} {}", self.server.pid, self.tunnel.pid)
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Role", "PID", "Command"]);

        for entry in [&self.server, &self.tunnel] {
            table.add_row(vec![
                entry.role.to_string(),
                entry.pid.to_string(),
                entry.command.clone(),
            ]);
        }
        table
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.table());
        out.push_str(&format!("Local server:  {}\n", self.local_url));
        if let Some(hostname) = &self.hostname {
            out.push_str(&format!("Public URL:    https://{hostname}\n"));
        }

        match self.policy {
            ShutdownPolicy::Terminate => {
                out.push_str("Press Ctrl-C to stop both processes.\n");
                out.push_str(&format!(
                    "If they survive, stop them with: {}\n",
                    self.kill_command()
                ));
            }
            ShutdownPolicy::Detach => {
                out.push_str("Ctrl-C leaves both processes running.\n");
                out.push_str(&format!("Stop them with: {}\n", self.kill_command()));
            }
        }
        out
    }
}

impl fmt::Display for LifecycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
