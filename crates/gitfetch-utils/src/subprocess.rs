use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::error::UtilError;
use crate::Result;

/// Stdio disposition for a child stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Inherit the parent's stream.
    Inherit,
    /// Pipe the stream so the parent can read or write it.
    Pipe,
    /// Redirect to /dev/null.
    Null,
}

impl StdioMode {
    fn to_stdio(self) -> Stdio {
        match self {
            StdioMode::Inherit => Stdio::inherit(),
            StdioMode::Pipe => Stdio::piped(),
            StdioMode::Null => Stdio::null(),
        }
    }
}

/// Builder for git helper subprocesses (`git index-pack`, `git unpack-objects`).
///
/// The pack dispatcher feeds the child's stdin from the demultiplexed wire
/// stream and, for a locked keep-pack, reads the lock file path from the
/// child's stdout.
pub struct GitCommand {
    subcommand: OsString,
    args: Vec<OsString>,
    stdin_mode: StdioMode,
    stdout_mode: StdioMode,
}

impl GitCommand {
    /// Create a builder for `git <subcommand>`.
    pub fn new(subcommand: impl AsRef<OsStr>) -> Self {
        Self {
            subcommand: subcommand.as_ref().to_os_string(),
            args: Vec::new(),
            stdin_mode: StdioMode::Inherit,
            stdout_mode: StdioMode::Inherit,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Set the stdin disposition.
    pub fn stdin(mut self, mode: StdioMode) -> Self {
        self.stdin_mode = mode;
        self
    }

    /// Set the stdout disposition.
    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout_mode = mode;
        self
    }

    /// Human-readable command line for error messages.
    pub fn display(&self) -> String {
        let mut s = format!("git {}", self.subcommand.to_string_lossy());
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    /// Spawn the child. Stderr is always inherited: progress from the
    /// ingester belongs on the user's terminal.
    pub fn spawn(&self) -> Result<Child> {
        Command::new("git")
            .arg(&self.subcommand)
            .args(&self.args)
            .stdin(self.stdin_mode.to_stdio())
            .stdout(self.stdout_mode.to_stdio())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| UtilError::Spawn {
                command: self.display(),
                source: e,
            })
    }

    /// Turn a nonzero exit status into an error.
    pub fn check_status(&self, status: ExitStatus) -> Result<()> {
        if status.success() {
            Ok(())
        } else {
            Err(UtilError::SubprocessFailed {
                command: self.display(),
                status,
            })
        }
    }
}
