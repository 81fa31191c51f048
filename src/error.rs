//! Error taxonomy for git operations
//!
//! Inspection never surfaces these (it degrades to safe defaults), mutating
//! operations fold them into a [`CommandResult`](crate::process::CommandResult)
//! so callers always get a value back.

use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds for git operations.
///
/// Messages never include credential values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitError {
    /// The git executable could not be started.
    #[error("failed to launch {program}: {reason}")]
    ProcessLaunch { program: String, reason: String },

    /// A well-formed invocation exited with a non-zero status.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The invocation exceeded its time budget and was killed.
    #[error("git {command} timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },

    /// `origin` is missing or has an empty URL.
    #[error("no remote configured for origin")]
    NoRemoteConfigured,

    /// Token authentication does not apply to SSH remotes.
    #[error("SSH remote detected: tokens cannot authenticate SSH, use SSH keys instead")]
    UnsupportedAuthScheme,

    /// The remote is neither HTTPS nor SSH.
    #[error("unsupported remote URL format: {0}")]
    UnsupportedRemoteFormat(String),

    /// A push needed a token and none was provided.
    #[error("no git token configured for push")]
    MissingCredential,

    /// The folder has no `.git` entry.
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),
}

impl GitError {
    /// Exit code reported when this error is folded into a command result.
    pub fn exit_code(&self) -> i32 {
        use crate::process::{LAUNCH_FAILURE_EXIT_CODE, NOT_RUN_EXIT_CODE, TERMINATED_EXIT_CODE};

        match self {
            GitError::ProcessLaunch { .. } => LAUNCH_FAILURE_EXIT_CODE,
            GitError::CommandFailed { exit_code, .. } => *exit_code,
            GitError::TimedOut { .. } => TERMINATED_EXIT_CODE,
            _ => NOT_RUN_EXIT_CODE,
        }
    }
}
