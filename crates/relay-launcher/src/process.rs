//! Long-running child processes
//!
//! Unlike [`relay_core::CommandRunner`], which runs a command to completion,
//! a [`ManagedProcess`] keeps its child alive until told otherwise. By
//! default dropping one does not kill the child, so a detached session leaves
//! both processes running after the launcher exits.
//!
//! Each child leads its own process group. Stopping a child signals the
//! group, which also reaches anything the child started.

use relay_core::{Invocation, RelayError, Result, StdioMode};
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tracing::{debug, info, warn};

/// Which of the two children this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Tunnel,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Tunnel => f.write_str("tunnel"),
        }
    }
}

/// How a child ended when asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// It had already exited on its own
    AlreadyExited(Option<i32>),
    /// It exited within the grace period after SIGTERM
    Terminated(Option<i32>),
    /// It ignored SIGTERM and was killed
    Killed,
}

/// A spawned child with its identity and launch command
#[derive(Debug)]
pub struct ManagedProcess {
    role: Role,
    child: Child,
    pid: u32,
    command: String,
    started_at: Instant,
    kill_on_drop: bool,
}

impl ManagedProcess {
    /// Spawn the invocation without waiting for it
    ///
    /// Stdin is always closed. With [`StdioMode::Inherit`] the child writes to
    /// the operator's terminal; otherwise its output is discarded.
    pub fn spawn(role: Role, invocation: &Invocation) -> Result<Self> {
        let mut command = invocation.to_command();
        command.stdin(Stdio::null());
        // Own process group, so a terminal Ctrl-C reaches only the supervisor
        #[cfg(unix)]
        command.process_group(0);
        match invocation.stdio {
            StdioMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            StdioMode::Capture => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = command.spawn().map_err(|source| RelayError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| RelayError::ConfigError(format!(
            "{role} process exited before its pid could be read"
        )))?;

        info!("Started {} (pid {}): {}", role, pid, invocation);

        Ok(Self {
            role,
            child,
            pid,
            command: invocation.to_string(),
            started_at: Instant::now(),
            kill_on_drop: false,
        })
    }

    /// Kill the process group when this handle is dropped
    ///
    /// Covers the window where a caller owns the child but may be cancelled
    /// before it can stop it properly.
    pub fn set_kill_on_drop(&mut self, kill_on_drop: bool) {
        self.kill_on_drop = kill_on_drop;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Exit code if the child has exited, `Ok(None)` while it runs
    pub fn try_wait(&mut self) -> Result<Option<Option<i32>>> {
        Ok(self.child.try_wait()?.map(|status| status.code()))
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Wait for the child to exit on its own
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        debug!("{} (pid {}) exited with {}", self.role, self.pid, status);
        Ok(status.code())
    }

    /// Ask the child to stop, escalating to a kill after `grace`
    ///
    /// On unix the signals go to the child's whole process group, so helpers
    /// it started (a reloader, a worker pool) stop with it. Once the leader
    /// is gone, whatever is left of the group is killed.
    pub async fn terminate(&mut self, grace: Duration) -> Result<Termination> {
        if let Some(code) = self.try_wait()? {
            self.kill_group()?;
            return Ok(Termination::AlreadyExited(code));
        }

        info!("Stopping {} (pid {})", self.role, self.pid);
        self.send_sigterm()?;

        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Termination::Terminated(status?.code()),
            Err(_) => {
                warn!(
                    "{} (pid {}) did not exit within {:?}, killing",
                    self.role, self.pid, grace
                );
                self.kill_now()?;
                self.child.wait().await?;
                Termination::Killed
            }
        };

        self.kill_group()?;
        Ok(outcome)
    }

    /// Kill the child and its group without waiting for either
    ///
    /// Usable where nothing can be awaited, such as a destructor.
    #[cfg(unix)]
    pub fn kill_now(&mut self) -> Result<()> {
        self.signal_group(libc::SIGKILL)
    }

    #[cfg(not(unix))]
    pub fn kill_now(&mut self) -> Result<()> {
        if self.try_wait()?.is_none() {
            self.child.start_kill()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn send_sigterm(&mut self) -> Result<()> {
        self.signal_group(libc::SIGTERM)
    }

    #[cfg(not(unix))]
    fn send_sigterm(&mut self) -> Result<()> {
        self.child.start_kill()?;
        Ok(())
    }

    /// Sweep up group members that outlived the leader
    #[cfg(unix)]
    fn kill_group(&mut self) -> Result<()> {
        self.signal_group(libc::SIGKILL)
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) -> Result<()> {
        Ok(())
    }

    /// The group id equals the pid because of `process_group(0)` at spawn
    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn signal_group(&self, signal: libc::c_int) -> Result<()> {
        let pgid = libc::pid_t::try_from(self.pid)
            .map_err(|_| RelayError::ConfigError(format!("pid {} out of range", self.pid)))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // ESRCH: every member of the group has already exited
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err.into());
            }
        }
        Ok(())
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.kill_on_drop {
            return;
        }
        warn!("Dropping {} (pid {}), killing its process group", self.role, self.pid);
        if let Err(e) = self.kill_now() {
            warn!("Failed to kill {} (pid {}): {}", self.role, self.pid, e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use crate::test_support::{gone, read_pid, running};

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut process = ManagedProcess::spawn(Role::Server, &sh("exit 3")).unwrap();
        assert!(process.pid() > 0);
        assert_eq!(process.command(), "sh -c \"exit 3\"");
        assert_eq!(process.wait().await.unwrap(), Some(3));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_terminate_running_child() {
        let mut process =
            ManagedProcess::spawn(Role::Tunnel, &Invocation::new("sleep").arg("30")).unwrap();
        assert!(process.is_running());

        let outcome = process.terminate(Duration::from_secs(5)).await.unwrap();
        // Killed by SIGTERM, so no exit code
        assert_eq!(outcome, Termination::Terminated(None));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let mut process =
            ManagedProcess::spawn(Role::Server, &sh("trap '' TERM; sleep 30")).unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = process.terminate(Duration::from_millis(200)).await.unwrap();
        assert_eq!(outcome, Termination::Killed);
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let mut process = ManagedProcess::spawn(Role::Server, &sh("exit 0")).unwrap();
        process.wait().await.unwrap();

        let outcome = process.terminate(Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, Termination::AlreadyExited(Some(0)));
    }

    #[tokio::test]
    async fn test_terminate_reaches_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!(
            "trap '' TERM; sleep 300 & echo $! > {}; wait",
            pid_file.display()
        );

        let mut process = ManagedProcess::spawn(Role::Server, &sh(&script)).unwrap();
        let grandchild = read_pid(&pid_file).await;
        assert!(running(grandchild));

        let outcome = process.terminate(Duration::from_millis(300)).await.unwrap();
        assert_eq!(outcome, Termination::Killed);
        assert!(gone(grandchild).await, "grandchild {grandchild} survived");
    }

    #[tokio::test]
    async fn test_terminate_sweeps_group_after_leader_exits() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        // The leader obeys SIGTERM, its background worker ignores it
        let script = format!(
            "(trap '' TERM; exec sleep 300) & echo $! > {}; wait",
            pid_file.display()
        );

        let mut process = ManagedProcess::spawn(Role::Server, &sh(&script)).unwrap();
        let worker = read_pid(&pid_file).await;

        process.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(gone(worker).await, "worker {worker} survived");
    }

    #[tokio::test]
    async fn test_kill_now_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("server.pid");
        let script = format!("echo $$ > {}; exec sleep 300", pid_file.display());

        let mut process = ManagedProcess::spawn(Role::Server, &sh(&script)).unwrap();
        let pid = read_pid(&pid_file).await;
        process.kill_now().unwrap();
        drop(process);

        assert!(gone(pid).await, "pid {pid} survived");
    }

    #[tokio::test]
    async fn test_kill_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("server.pid");
        let script = format!("echo $$ > {}; exec sleep 300", pid_file.display());

        let mut armed = ManagedProcess::spawn(Role::Server, &sh(&script)).unwrap();
        armed.set_kill_on_drop(true);
        let pid = read_pid(&pid_file).await;
        drop(armed);
        assert!(gone(pid).await, "pid {pid} survived its handle");

        std::fs::remove_file(&pid_file).unwrap();
        let mut disarmed = ManagedProcess::spawn(Role::Server, &sh(&script)).unwrap();
        disarmed.set_kill_on_drop(true);
        disarmed.set_kill_on_drop(false);
        let pid = read_pid(&pid_file).await;
        drop(disarmed);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(running(pid));

        // SIGKILL through the shell, since the handle is gone
        std::process::Command::new("kill")
            .args(["-9", &pid.to_string()])
            .status()
            .unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = ManagedProcess::spawn(
            Role::Server,
            &Invocation::new("definitely-not-a-real-program-91c4"),
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::Spawn { .. }));
    }
}
