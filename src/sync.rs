//! Sync Engine - Commits and pushes every repository in a tree
//!
//! Repositories are processed one at a time, in the order given (nested
//! repositories before the one enclosing them). A failure in one repository
//! is recorded in the report and the sweep moves on.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::{repository_label, RepoScanner};
use crate::git::RepoState;
use crate::process::{CommandResult, CommandRunner, GitProcess};
use crate::synchronizer::RepoSynchronizer;

// progress sub-steps per repository
const STEPS: f32 = 6.0;

/// What happened to one repository during a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    NoChanges,
    CommittedAndPushed,
    PushedOnly,
    CommitFailed { reason: String },
    PushFailed { reason: String, committed: bool },
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::NoChanges => "No Changes",
            SyncOutcome::CommittedAndPushed => "Committed and Pushed",
            SyncOutcome::PushedOnly => "Pushed",
            SyncOutcome::CommitFailed { .. } => "Commit Failed",
            SyncOutcome::PushFailed { .. } => "Push Failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SyncOutcome::CommitFailed { reason } | SyncOutcome::PushFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.reason().is_some()
    }
}

/// Outcome for one repository
#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
    pub label: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Results from a complete sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub entries: Vec<RepoReport>,
    pub repositories_found: usize,
    pub processed: usize,
    pub committed: usize,
    pub pushed: usize,
    pub cancelled: bool,
    #[serde(skip)]
    pub duration: Duration,
}

impl BatchReport {
    fn new(repositories_found: usize) -> Self {
        Self {
            repositories_found,
            ..Self::default()
        }
    }

    /// Append an outcome, keeping the summary counts in step
    pub fn record(&mut self, path: &Path, outcome: SyncOutcome) {
        self.processed += 1;
        match outcome {
            SyncOutcome::CommittedAndPushed => {
                self.committed += 1;
                self.pushed += 1;
            }
            SyncOutcome::PushedOnly => self.pushed += 1,
            _ => {}
        }

        self.entries.push(RepoReport {
            label: repository_label(path),
            path: path.to_path_buf(),
            outcome,
        });
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_failure())
            .count()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.entries.iter().map(|entry| &entry.outcome)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Processed: {}, Repositories Found: {}, Committed: {}, Pushed: {}",
            self.processed, self.repositories_found, self.committed, self.pushed
        )
    }

    /// Plain-text report, one line per repository
    pub fn render(&self) -> String {
        let mut out = self.summary_line();
        out.push('\n');

        for entry in &self.entries {
            let _ = match entry.outcome.reason() {
                Some(reason) => writeln!(
                    out,
                    "- [{}] {}: {}",
                    entry.outcome.label(),
                    entry.label,
                    reason
                ),
                None => writeln!(out, "- [{}] {}", entry.outcome.label(), entry.label),
            };
        }

        if self.cancelled {
            out.push_str("Cancelled before all repositories were processed\n");
        }

        out
    }
}

/// Progress notification for a running sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    pub label: String,
    /// Monotonically increasing, within [0, 1]
    pub fraction: f32,
    pub repository: Option<PathBuf>,
}

/// Cooperative cancellation for a sweep.
///
/// Checked before each repository; a git process already running is left to
/// finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A sweep running on a background task
pub struct SyncHandle {
    pub progress: mpsc::UnboundedReceiver<SyncProgress>,
    pub task: JoinHandle<BatchReport>,
}

impl SyncHandle {
    /// Forward progress until the sweep ends, then return its report
    pub async fn wait(mut self, mut on_progress: impl FnMut(SyncProgress)) -> Result<BatchReport> {
        while let Some(update) = self.progress.recv().await {
            on_progress(update);
        }

        self.task.await.context("Sync task failed")
    }
}

/// Runs the commit/push/fetch sweep over many repositories
pub struct SyncEngine<R = GitProcess> {
    synchronizer: RepoSynchronizer<R>,
    scanner: RepoScanner,
}

impl<R> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            synchronizer: self.synchronizer.clone(),
            scanner: self.scanner.clone(),
        }
    }
}

impl<R: CommandRunner + 'static> SyncEngine<R> {
    pub fn new(synchronizer: RepoSynchronizer<R>, scanner: RepoScanner) -> Self {
        Self {
            synchronizer,
            scanner,
        }
    }

    pub fn synchronizer(&self) -> &RepoSynchronizer<R> {
        &self.synchronizer
    }

    pub fn scanner(&self) -> &RepoScanner {
        &self.scanner
    }

    /// Synchronize every root in order and report per-repository outcomes
    pub async fn sync_all<F>(
        &self,
        roots: &[PathBuf],
        credential: Option<&str>,
        cancel: &CancelFlag,
        mut progress: F,
    ) -> BatchReport
    where
        F: FnMut(SyncProgress),
    {
        let start_time = Instant::now();
        let total = roots.len();
        let mut report = BatchReport::new(total);

        info!("Synchronizing {} repositories", total);

        for (index, root) in roots.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Sync cancelled after {} of {} repositories",
                    index, total
                );
                report.cancelled = true;
                break;
            }

            let outcome = self
                .sync_one(root, credential, |label: String, step: f32| {
                    progress(SyncProgress {
                        label,
                        fraction: fraction(index, step, total),
                        repository: Some(root.clone()),
                    })
                })
                .await;

            match &outcome {
                SyncOutcome::CommitFailed { reason } | SyncOutcome::PushFailed { reason, .. } => {
                    warn!("{}: {} ({})", root.display(), outcome.label(), reason)
                }
                _ => info!("{}: {}", root.display(), outcome.label()),
            }
            report.record(root, outcome);
        }

        report.duration = start_time.elapsed();
        progress(SyncProgress {
            label: "Done".to_string(),
            fraction: 1.0,
            repository: None,
        });

        info!(
            "Sync completed in {:.2}s: {}",
            report.duration.as_secs_f64(),
            report.summary_line()
        );

        report
    }

    /// Run [`SyncEngine::sync_all`] on a background task
    pub fn spawn_sync_all(
        &self,
        roots: Vec<PathBuf>,
        credential: Option<String>,
        cancel: CancelFlag,
    ) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = self.clone();

        let task = tokio::spawn(async move {
            engine
                .sync_all(&roots, credential.as_deref(), &cancel, |update| {
                    // receiver gone means nobody is watching; keep going
                    let _ = tx.send(update);
                })
                .await
        });

        SyncHandle { progress: rx, task }
    }

    /// Scan `root_dir` and synchronize everything found
    pub async fn sync_tree<F>(
        &self,
        root_dir: &Path,
        include_enclosing: bool,
        credential: Option<&str>,
        cancel: &CancelFlag,
        progress: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(SyncProgress),
    {
        let roots = self.scanner.sync_roots(root_dir, include_enclosing)?;
        Ok(self.sync_all(&roots, credential, cancel, progress).await)
    }

    /// Inspect every root without changing anything
    pub async fn preview(&self, roots: &[PathBuf]) -> Vec<RepoState> {
        info!("Running dry-run analysis of {} repositories", roots.len());

        let mut states = Vec::with_capacity(roots.len());
        for root in roots {
            states.push(self.synchronizer.git().inspect(root).await);
        }
        states
    }

    async fn sync_one<P>(&self, root: &Path, credential: Option<&str>, mut report: P) -> SyncOutcome
    where
        P: FnMut(String, f32),
    {
        let name = repository_label(root);
        let git = self.synchronizer.git();

        report(format!("{}: checking status", name), 1.0);
        let state = git.inspect(root).await;

        if !state.is_root {
            return SyncOutcome::CommitFailed {
                reason: format!("not a git repository: {}", root.display()),
            };
        }
        if !state.needs_sync() {
            debug!("{} has nothing to commit or push", name);
            return SyncOutcome::NoChanges;
        }

        let committed = state.has_uncommitted_changes;
        if committed {
            report(format!("{}: staging and committing", name), 3.0);
            let result = self.synchronizer.commit(root, "").await;
            if !result.success() {
                return SyncOutcome::CommitFailed {
                    reason: failure_reason(&result),
                };
            }
        }

        report(format!("{}: pushing", name), 5.0);
        let push = self.synchronizer.push(root, credential).await;

        let fetch = self.synchronizer.fetch(root).await;
        if !fetch.success() {
            warn!("Fetch after push failed for {}: {}", name, fetch.first_line());
        }

        if !push.success() {
            SyncOutcome::PushFailed {
                reason: failure_reason(&push),
                committed,
            }
        } else if committed {
            SyncOutcome::CommittedAndPushed
        } else {
            SyncOutcome::PushedOnly
        }
    }
}

fn fraction(index: usize, step: f32, total: usize) -> f32 {
    ((index as f32 + step / STEPS) / total.max(1) as f32).clamp(0.0, 1.0)
}

fn failure_reason(result: &CommandResult) -> String {
    match result.first_line() {
        "" => format!("exit code {}", result.exit_code),
        line => line.to_string(),
    }
}
