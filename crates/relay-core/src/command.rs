//! External command seam
//!
//! Every call out to `python`, `pip`, `uv` or `cloudflared` that runs to
//! completion goes through [`CommandRunner`], so the bootstrap and
//! registration flows can be exercised without those tools installed.
//! Long-running children (server, tunnel) are spawned by the launcher
//! directly because they must outlive a single call.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Capture stdout/stderr for parsing
    #[default]
    Capture,
    /// Share the operator's terminal (interactive or long output)
    Inherit,
}

/// A fully described external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub stdio: StdioMode,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            stdio: StdioMode::Capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn inherit(mut self) -> Self {
        self.stdio = StdioMode::Inherit;
        self
    }

    /// Build the tokio command for this invocation
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of a completed external command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`RelayError::CommandFailed`]
    pub fn check(self, program: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RelayError::command_failed(program, self.code, &self.stderr))
        }
    }
}

/// Runs external commands to completion
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation and wait for it to exit
    ///
    /// A non-zero exit is not an error at this level; callers decide with
    /// [`CommandOutput::check`].
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("Running: {}", invocation);

        let mut command = invocation.to_command();
        command.stdin(Stdio::inherit());

        let spawn_error = |source| RelayError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        match invocation.stdio {
            StdioMode::Capture => {
                let output = command.output().await.map_err(spawn_error)?;
                Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            StdioMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
                let status = command.status().await.map_err(spawn_error)?;
                Ok(CommandOutput {
                    code: status.code(),
                    ..Default::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("cloudflared")
            .args(["tunnel", "create"])
            .arg("stock analysis");
        assert_eq!(
            invocation.to_string(),
            "cloudflared tunnel create \"stock analysis\""
        );
        assert_eq!(invocation.stdio, StdioMode::Capture);
        assert_eq!(invocation.inherit().stdio, StdioMode::Inherit);
    }

    #[test]
    fn test_output_check() {
        assert!(CommandOutput::success("ok").check("pip").is_ok());

        let err = CommandOutput::failure(2, "no such package")
            .check("pip")
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::CommandFailed { code: Some(2), .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let output = SystemRunner
            .run(&Invocation::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let result = SystemRunner
            .run(&Invocation::new("definitely-not-a-real-binary-4f1c"))
            .await;
        assert!(matches!(result, Err(RelayError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_mock_runner() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.program == "uv")
            .times(1)
            .returning(|_| Ok(CommandOutput::success("done")));

        let output = runner.run(&Invocation::new("uv")).await.unwrap();
        assert_eq!(output.stdout, "done");
    }
}
