//! Per-repository orchestration: stage, commit, push, fetch, pull
//!
//! Every operation returns a [`CommandResult`]; failures never cross this
//! boundary as errors. Nothing is retried.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::GitError;
use crate::git::GitClient;
use crate::process::{CommandResult, CommandRunner, GitProcess};
use crate::remote::AuthenticatedUrl;

/// Visually blank commit message used when none is given.
///
/// Braille blanks are not whitespace to git, so the commit is accepted.
pub const EMPTY_COMMIT_MESSAGE: &str = "\u{2800}\u{2800}\u{2800}\u{2800}\u{2800}";

const UP_TO_DATE: &str = "Already up to date.";

// Shorter tokens are only scrubbed as part of the remote URL
const MIN_SCRUB_LEN: usize = 8;

/// Where a commit/push/fetch sequence stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStage {
    Idle,
    Staging,
    Committing,
    Pushing,
    Fetching,
    Done,
}

/// Results of every stage of [`RepoSynchronizer::commit_push_fetch`]
#[derive(Debug, Clone, Serialize)]
pub struct CommitPushFetch {
    pub commit: CommandResult,
    pub push: CommandResult,
    pub fetch: CommandResult,
    pub stage: SyncStage,
    /// First stage that failed, if any
    pub failed_stage: Option<SyncStage>,
}

impl CommitPushFetch {
    pub fn succeeded(&self) -> bool {
        self.commit.success() && self.push.success()
    }
}

pub struct RepoSynchronizer<R = GitProcess> {
    git: GitClient<R>,
    ssh_fallback: bool,
}

impl<R> Clone for RepoSynchronizer<R> {
    fn clone(&self) -> Self {
        Self {
            git: self.git.clone(),
            ssh_fallback: self.ssh_fallback,
        }
    }
}

impl<R: CommandRunner> RepoSynchronizer<R> {
    pub fn new(git: GitClient<R>) -> Self {
        Self {
            git,
            ssh_fallback: false,
        }
    }

    /// Push SSH remotes with ambient SSH credentials instead of failing
    pub fn with_ssh_fallback(mut self, enabled: bool) -> Self {
        self.ssh_fallback = enabled;
        self
    }

    pub fn git(&self) -> &GitClient<R> {
        &self.git
    }

    /// Stage everything and commit. An empty message is replaced by
    /// [`EMPTY_COMMIT_MESSAGE`].
    pub async fn commit(&self, path: &Path, message: &str) -> CommandResult {
        self.stage_and_commit(path, message).await.1
    }

    /// Push `HEAD` to `origin` using the credential for HTTPS remotes
    pub async fn push(&self, path: &Path, credential: Option<&str>) -> CommandResult {
        if let Err(result) = self.ensure_repository(path) {
            return result;
        }

        let target = match self.git.resolve_push_target(path, credential).await {
            Ok(target) => target,
            Err(GitError::UnsupportedAuthScheme) if self.ssh_fallback => {
                info!(
                    "SSH remote for {}, pushing with ambient credentials",
                    path.display()
                );
                return self.git.run(path, &["push"]).await;
            }
            Err(e) => return CommandResult::from_error(&e),
        };

        info!("Pushing {} to {}", path.display(), target);
        let result = self.git.run(path, &["push", target.expose(), "HEAD"]).await;
        if !result.success() {
            warn!("Push failed for {}", path.display());
        }

        scrub_credential(result, &target, credential)
    }

    pub async fn fetch(&self, path: &Path) -> CommandResult {
        if let Err(result) = self.ensure_repository(path) {
            return result;
        }

        debug!("Fetching {}", path.display());
        self.git.run(path, &["fetch"]).await
    }

    /// Pull, but only when the branch is behind its upstream
    pub async fn pull(&self, path: &Path) -> CommandResult {
        if let Err(result) = self.ensure_repository(path) {
            return result;
        }

        if !self.git.is_behind_upstream(path).await {
            debug!("{} is not behind upstream, skipping pull", path.display());
            return CommandResult::ok(UP_TO_DATE);
        }

        info!("Pulling {}", path.display());
        self.git.run(path, &["pull"]).await
    }

    /// Fetch, then pull if the fetch revealed new upstream commits
    pub async fn fetch_pull(&self, path: &Path) -> CommandResult {
        let fetched = self.fetch(path).await;
        if !fetched.success() {
            return fetched;
        }
        self.pull(path).await
    }

    /// Commit, push, and fetch, always attempting every stage.
    ///
    /// A failed commit still pushes earlier unpushed commits, and the fetch
    /// refreshes tracking refs after any push attempt.
    pub async fn commit_push_fetch(
        &self,
        path: &Path,
        message: &str,
        credential: Option<&str>,
    ) -> CommitPushFetch {
        let mut failed_stage = None;

        let (commit_stage, commit) = self.stage_and_commit(path, message).await;
        if !commit.success() {
            failed_stage = Some(commit_stage);
        }

        let push = self.push(path, credential).await;
        if !push.success() {
            failed_stage = failed_stage.or(Some(SyncStage::Pushing));
        }

        let fetch = self.fetch(path).await;
        if !fetch.success() {
            failed_stage = failed_stage.or(Some(SyncStage::Fetching));
        }

        CommitPushFetch {
            commit,
            push,
            fetch,
            stage: SyncStage::Done,
            failed_stage,
        }
    }

    /// Returns the stage the commit step ended in with its result
    async fn stage_and_commit(&self, path: &Path, message: &str) -> (SyncStage, CommandResult) {
        if let Err(result) = self.ensure_repository(path) {
            return (SyncStage::Idle, result);
        }

        let staged = self.git.run(path, &["add", "."]).await;
        if !staged.success() {
            warn!(
                "Staging failed for {}: {}",
                path.display(),
                staged.first_line()
            );
            return (SyncStage::Staging, staged);
        }

        let placeholder = message.trim().is_empty();
        let message = if placeholder {
            EMPTY_COMMIT_MESSAGE
        } else {
            message
        };

        let mut result = self.git.run(path, &["commit", "-m", message]).await;
        if placeholder {
            result.stdout = result.stdout.replace(EMPTY_COMMIT_MESSAGE, "");
        }

        if result.success() {
            info!("Committed changes in {}", path.display());
        } else {
            warn!(
                "Commit failed for {}: {}",
                path.display(),
                result.first_line()
            );
        }

        (SyncStage::Committing, result)
    }

    fn ensure_repository(&self, path: &Path) -> Result<(), CommandResult> {
        if self.git.is_repository_root(path) {
            return Ok(());
        }

        let error = GitError::NotARepository(path.to_path_buf());
        warn!("{}", error);
        Err(CommandResult::from_error(&error))
    }
}

// git may echo the remote URL in push output
fn scrub_credential(
    mut result: CommandResult,
    target: &AuthenticatedUrl,
    credential: Option<&str>,
) -> CommandResult {
    let scrub = |text: &str| -> String {
        let mut text = text.replace(target.expose(), &target.to_string());
        if let Some(secret) = credential
            .map(str::trim)
            .filter(|s| s.len() >= MIN_SCRUB_LEN)
        {
            text = text.replace(secret, "***");
        }
        text
    };

    result.stdout = scrub(&result.stdout);
    result.stderr = scrub(&result.stderr);
    result
}
