//! Subprocess execution behind a narrow capability trait.
//!
//! Every call into the client binary (version probe, status, login, logout,
//! package expansion) goes through [`ProcessExecutor`], so tests can script
//! output without spawning real binaries.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A program, its arguments and the environment variables to add.
///
/// The child inherits the parent environment; `env` entries are layered on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Start an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value of an added environment variable.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Outcome of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Whether the process exited successfully.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Captured standard output (empty for interactive runs).
    pub stdout: String,
    /// Captured standard error (empty for interactive runs).
    pub stderr: String,
}

impl ProcessOutput {
    /// A successful run with the given stdout.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout followed by stderr, as a terminal would show them.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Capability to run subprocesses.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run to completion with stdin closed, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be spawned.
    async fn output(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput>;

    /// Run attached to the terminal (stdin, stdout and stderr inherited).
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be spawned.
    async fn interactive(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput>;
}

/// Executor spawning real processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

#[async_trait]
impl ProcessExecutor for SystemExecutor {
    async fn output(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        debug!(command = %invocation, "Running process");
        let output = Self::command(invocation)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn interactive(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        debug!(command = %invocation, "Running interactive process");
        let status = Self::command(invocation)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        Ok(ProcessOutput {
            success: status.success(),
            code: status.code(),
            ..ProcessOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("/opt/tsh")
            .arg("status")
            .args(["--proxy=p", "--user=u"])
            .env("TELEPORT_HOME", "/a")
            .env("TELEPORT_HOME", "/b");

        assert_eq!(inv.to_string(), "/opt/tsh status --proxy=p --user=u");
        assert_eq!(inv.env_value("TELEPORT_HOME"), Some("/b"));
        assert_eq!(inv.env_value("MISSING"), None);
    }

    #[test]
    fn test_combined_output() {
        let out = ProcessOutput {
            success: false,
            code: Some(1),
            stdout: "out\n".into(),
            stderr: "err\n".into(),
        };
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_executor_captures_output() {
        let inv = Invocation::new("sh")
            .args(["-c", "echo \"$GREETING\"; echo oops >&2; exit 3"])
            .env("GREETING", "hello");

        let out = SystemExecutor.output(&inv).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_system_executor_missing_program() {
        let inv = Invocation::new("/definitely/not/a/program");
        assert!(SystemExecutor.output(&inv).await.is_err());
    }
}
