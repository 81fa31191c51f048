//! Process runner for external git invocations
//!
//! Commands are executed directly (never through a shell), with a fixed
//! locale so porcelain markers such as `ahead`/`behind` are stable, and with
//! a bounded wait: a hung process is killed once its timeout expires.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::GitConfig;
use crate::error::GitError;
use crate::remote::redact_url;

/// The process could not be started, or waiting on it failed.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;
/// The process timed out or was terminated by a signal.
pub const TERMINATED_EXIT_CODE: i32 = -2;
/// The operation short-circuited before any process was started.
pub const NOT_RUN_EXIT_CODE: i32 = -3;

/// Captured outcome of one external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    /// Successful result with the given output
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Failed result with an empty stdout
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Fold a short-circuit error into the command result convention
    pub fn from_error(error: &GitError) -> Self {
        Self::failure(error.exit_code(), error.to_string())
    }

    fn from_output(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(TERMINATED_EXIT_CODE),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First non-empty line of stderr, or of stdout when stderr is blank
    pub fn first_line(&self) -> &str {
        fn first(text: &str) -> Option<&str> {
            text.lines().map(str::trim).find(|line| !line.is_empty())
        }
        first(&self.stderr).or_else(|| first(&self.stdout)).unwrap_or("")
    }

    /// Describe a failed result as a [`GitError`]; `None` on success
    pub fn to_error(&self, command: &str) -> Option<GitError> {
        if self.success() {
            return None;
        }
        Some(GitError::CommandFailed {
            command: command.to_string(),
            exit_code: self.exit_code,
            stderr: self.first_line().to_string(),
        })
    }
}

/// Executes git commands in a working directory.
///
/// Implementations must never panic or return early on a failed invocation;
/// every failure is encoded in the returned [`CommandResult`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, working_dir: &Path, args: &[&str]) -> CommandResult;
}

/// The real runner, spawning the git executable
#[derive(Debug, Clone)]
pub struct GitProcess {
    program: String,
    timeout: Duration,
    locale: String,
}

impl GitProcess {
    pub fn new() -> Self {
        Self::from_config(&GitConfig::default())
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout),
            locale: config.locale.clone(),
        }
    }

    /// Use a different executable (mainly for tests)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for GitProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for GitProcess {
    async fn run(&self, working_dir: &Path, args: &[&str]) -> CommandResult {
        let shown = display_command(args);
        debug!("Running {} {} in {}", self.program, shown, working_dir.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(working_dir)
            .env("LC_ALL", &self.locale)
            .env("LANG", &self.locale)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: a terminal Ctrl-C reaches gitfolder only, so a
        // running commit or push is never interrupted mid-write.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error = GitError::ProcessLaunch {
                    program: self.program.clone(),
                    reason: e.to_string(),
                };
                warn!("Command '{} {}' failed: {}", self.program, shown, error);
                return CommandResult::from_error(&error);
            }
        };

        // Both pipes are drained concurrently by wait_with_output; dropping the
        // future on timeout kills the child.
        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => CommandResult::from_output(output),
            Ok(Err(e)) => {
                warn!("Waiting on '{} {}' failed: {}", self.program, shown, e);
                CommandResult::failure(LAUNCH_FAILURE_EXIT_CODE, e.to_string())
            }
            Err(_) => {
                let error = GitError::TimedOut {
                    command: shown,
                    seconds: self.timeout.as_secs(),
                };
                warn!("{}", error);
                CommandResult::from_error(&error)
            }
        }
    }
}

/// Join arguments for logging with any embedded credentials masked
pub fn display_command(args: &[&str]) -> String {
    args.iter()
        .map(|arg| redact_url(arg))
        .collect::<Vec<_>>()
        .join(" ")
}
