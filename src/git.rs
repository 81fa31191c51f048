use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::process::{CommandResult, CommandRunner, GitProcess};

// `[ahead N]`, `[behind M]`, or `[ahead N, behind M]` on the branch header
const BRANCH_COUNTS_PATTERN: &str = r"\[ahead (\d+)(?:, behind (\d+))?\]|\[behind (\d+)\]";

/// Read-only queries against a single repository.
///
/// Every query re-runs git; nothing is cached between calls. Failed queries
/// fail closed: boolean answers collapse to `false` and a warning is logged.
pub struct GitClient<R = GitProcess> {
    runner: Arc<R>,
}

impl<R> Clone for GitClient<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

/// Snapshot of a repository taken by [`GitClient::inspect`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoState {
    pub path: PathBuf,
    pub is_root: bool,
    pub has_uncommitted_changes: bool,
    pub changed_files: Vec<ChangeEntry>,
    /// Commits the upstream lacks
    pub ahead: u32,
    /// Commits the local branch lacks
    pub behind: u32,
    pub upstream_ref: Option<String>,
    pub current_branch: Option<String>,
}

impl RepoState {
    pub fn is_ahead_of_upstream(&self) -> bool {
        self.ahead > 0
    }

    pub fn is_behind_upstream(&self) -> bool {
        self.behind > 0
    }

    /// Something to commit or push
    pub fn needs_sync(&self) -> bool {
        self.has_uncommitted_changes || self.is_ahead_of_upstream()
    }
}

/// Human label for a porcelain status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusLabel {
    Untracked,
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Conflict,
    Changed,
}

impl StatusLabel {
    /// Label derived from the first non-space character of the code
    pub fn from_code(code: &str) -> Self {
        match code.trim_start().chars().next() {
            Some('?') => StatusLabel::Untracked,
            Some('A') => StatusLabel::Added,
            Some('M') => StatusLabel::Modified,
            Some('D') => StatusLabel::Deleted,
            Some('R') => StatusLabel::Renamed,
            Some('C') => StatusLabel::Copied,
            Some('U') => StatusLabel::Conflict,
            _ => StatusLabel::Changed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Untracked => "Untracked",
            StatusLabel::Added => "Added",
            StatusLabel::Modified => "Modified",
            StatusLabel::Deleted => "Deleted",
            StatusLabel::Renamed => "Renamed",
            StatusLabel::Copied => "Copied",
            StatusLabel::Conflict => "Conflict",
            StatusLabel::Changed => "Changed",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of `git status --porcelain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    /// Raw two-character code, trimmed
    pub status_code: String,
    pub label: StatusLabel,
    /// Path relative to the repository root
    pub path: String,
}

impl ChangeEntry {
    /// Parse a porcelain line. Lines too short to carry a code become
    /// path-only entries.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);

        match (line.get(..2), line.get(3..)) {
            (Some(code), Some(path)) if !path.trim().is_empty() => {
                let status_code = code.trim().to_string();
                Self {
                    label: StatusLabel::from_code(&status_code),
                    status_code,
                    path: path.trim().to_string(),
                }
            }
            _ => Self {
                status_code: String::new(),
                label: StatusLabel::Changed,
                path: line.trim().to_string(),
            },
        }
    }
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.label, self.path)
    }
}

/// Ahead/behind counts against the tracking branch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpstreamStatus {
    pub ahead: u32,
    pub behind: u32,
}

/// Parse every non-blank line of porcelain status output
pub fn parse_porcelain_status(output: &str) -> Vec<ChangeEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(ChangeEntry::parse)
        .collect()
}

/// Parse the `## branch...upstream [ahead N, behind M]` header of
/// `git status --porcelain -b`
pub fn parse_upstream_status(output: &str) -> UpstreamStatus {
    let Some(header) = output.lines().next().filter(|line| line.starts_with("##")) else {
        return UpstreamStatus::default();
    };

    branch_counts_regex()
        .and_then(|re| {
            re.captures(header).map(|caps| {
                let count = |group: usize| -> u32 {
                    caps.get(group)
                        .and_then(|m| m.as_str().parse().ok())
                        .unwrap_or(0)
                };
                UpstreamStatus {
                    ahead: count(1),
                    behind: count(2).max(count(3)),
                }
            })
        })
        .unwrap_or_default()
}

fn branch_counts_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

    PATTERN
        .get_or_init(|| match Regex::new(BRANCH_COUNTS_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid branch header pattern: {}", e);
                None
            }
        })
        .as_ref()
}

/// True iff a `.git` directory or file sits directly under `path`
pub fn is_repository_root(path: &Path) -> bool {
    path.join(".git").exists()
}

impl<R: CommandRunner> GitClient<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    pub fn from_shared(runner: Arc<R>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run an arbitrary git command in `path`
    pub async fn run(&self, path: &Path, args: &[&str]) -> CommandResult {
        self.runner.run(path, args).await
    }

    pub fn is_repository_root(&self, path: &Path) -> bool {
        is_repository_root(path)
    }

    /// Full state refresh for one repository
    pub async fn inspect(&self, path: &Path) -> RepoState {
        if !is_repository_root(path) {
            debug!("Not a repository root: {}", path.display());
            return RepoState {
                path: path.to_path_buf(),
                ..RepoState::default()
            };
        }

        debug!("Inspecting repository: {}", path.display());

        let changed_files = self
            .porcelain_status(path)
            .await
            .map(|output| parse_porcelain_status(&output))
            .unwrap_or_default();
        let upstream = self.upstream_status(path).await;

        RepoState {
            path: path.to_path_buf(),
            is_root: true,
            has_uncommitted_changes: !changed_files.is_empty(),
            changed_files,
            ahead: upstream.ahead,
            behind: upstream.behind,
            upstream_ref: self.upstream_ref(path).await,
            current_branch: self.current_branch(path).await,
        }
    }

    pub async fn has_uncommitted_changes(&self, path: &Path) -> bool {
        self.porcelain_status(path)
            .await
            .map(|output| !output.trim().is_empty())
            .unwrap_or(false)
    }

    pub async fn list_changed_files(&self, path: &Path) -> Vec<ChangeEntry> {
        self.porcelain_status(path)
            .await
            .map(|output| parse_porcelain_status(&output))
            .unwrap_or_default()
    }

    pub async fn is_ahead_of_upstream(&self, path: &Path) -> bool {
        self.upstream_status(path).await.ahead > 0
    }

    pub async fn is_behind_upstream(&self, path: &Path) -> bool {
        self.upstream_status(path).await.behind > 0
    }

    /// Ahead/behind counts; zero when there is no upstream or the query fails
    pub async fn upstream_status(&self, path: &Path) -> UpstreamStatus {
        let result = self.run(path, &["status", "--porcelain", "-b"]).await;
        if !result.success() {
            warn!(
                "Status check failed for {}: {}",
                path.display(),
                result.first_line()
            );
            return UpstreamStatus::default();
        }

        parse_upstream_status(&result.stdout)
    }

    pub async fn current_branch(&self, path: &Path) -> Option<String> {
        let result = self.run(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
        non_empty_stdout(&result)
    }

    /// Tracking branch such as `origin/main`
    pub async fn upstream_ref(&self, path: &Path) -> Option<String> {
        let result = self
            .run(
                path,
                &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
            )
            .await;

        if !result.success() {
            debug!(
                "No upstream for {}: {}",
                path.display(),
                result.first_line()
            );
        }
        non_empty_stdout(&result)
    }

    async fn porcelain_status(&self, path: &Path) -> Option<String> {
        let result = self.run(path, &["status", "--porcelain"]).await;
        if result.success() {
            Some(result.stdout)
        } else {
            warn!(
                "Failed to check git status for {}: {}",
                path.display(),
                result.first_line()
            );
            None
        }
    }
}

fn non_empty_stdout(result: &CommandResult) -> Option<String> {
    let value = result.stdout.trim();
    (result.success() && !value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Answers every command with the same result
    struct FixedRunner(CommandResult);

    #[async_trait]
    impl CommandRunner for FixedRunner {
        async fn run(&self, _working_dir: &Path, _args: &[&str]) -> CommandResult {
            self.0.clone()
        }
    }

    fn repo_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    #[test]
    fn test_status_labels() {
        let cases = [
            ("?? Assets/New.cs", StatusLabel::Untracked),
            ("A  Assets/Added.cs", StatusLabel::Added),
            ("M  src/Foo.cs", StatusLabel::Modified),
            (" M src/Foo.cs", StatusLabel::Modified),
            (" D Gone.cs", StatusLabel::Deleted),
            ("R  old.cs -> new.cs", StatusLabel::Renamed),
            ("C  copy.cs", StatusLabel::Copied),
            ("UU conflict.cs", StatusLabel::Conflict),
            ("!! ignored.log", StatusLabel::Changed),
            (" T typechange.cs", StatusLabel::Changed),
        ];

        for (line, expected) in cases {
            assert_eq!(ChangeEntry::parse(line).label, expected, "line: {line:?}");
        }
    }

    #[test]
    fn test_change_entry_fields() {
        let entry = ChangeEntry::parse("M  src/Foo.cs");
        assert_eq!(entry.status_code, "M");
        assert_eq!(entry.label, StatusLabel::Modified);
        assert_eq!(entry.path, "src/Foo.cs");
        assert_eq!(entry.to_string(), "[Modified] src/Foo.cs");

        let entry = ChangeEntry::parse("?? Assets/Textures/");
        assert_eq!(entry.status_code, "??");
        assert_eq!(entry.path, "Assets/Textures/");
    }

    #[test]
    fn test_short_lines_degrade_to_path_only() {
        for line in ["x", "ab", "abc", "M "] {
            let entry = ChangeEntry::parse(line);
            assert_eq!(entry.status_code, "");
            assert_eq!(entry.label, StatusLabel::Changed);
            assert_eq!(entry.path, line.trim());
        }
    }

    #[test]
    fn test_parse_porcelain_status_skips_blank_lines() {
        let output = "M  a.cs\n\n?? b.cs\r\n   \n";
        let entries = parse_porcelain_status(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.cs");
        assert_eq!(entries[1].path, "b.cs");
        assert_eq!(entries[1].label, StatusLabel::Untracked);
    }

    #[test]
    fn test_parse_upstream_status() {
        let cases = [
            ("## main...origin/main\n", 0, 0),
            ("## main...origin/main [ahead 3]\n M a.cs\n", 3, 0),
            ("## main...origin/main [behind 2]\n", 0, 2),
            ("## main...origin/main [ahead 1, behind 4]\n", 1, 4),
            ("## main...origin/main [gone]\n", 0, 0),
            ("## No commits yet on main\n", 0, 0),
            ("## HEAD (no branch)\n", 0, 0),
            ("", 0, 0),
            // markers outside the branch header are ignored
            (" M notes/[ahead 9].txt\n", 0, 0),
        ];

        for (output, ahead, behind) in cases {
            assert_eq!(
                parse_upstream_status(output),
                UpstreamStatus { ahead, behind },
                "output: {output:?}"
            );
        }
    }

    #[test]
    fn test_branch_counts_pattern_compiles_once() {
        let first = branch_counts_regex().unwrap();
        let second = branch_counts_regex().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_is_repository_root() {
        let dir = TempDir::new().unwrap();
        assert!(!is_repository_root(dir.path()));

        // worktrees and submodules use a .git file
        std::fs::write(dir.path().join(".git"), "gitdir: ../.git/modules/sub\n").unwrap();
        assert!(is_repository_root(dir.path()));

        let other = repo_dir();
        assert!(is_repository_root(other.path()));
    }

    #[tokio::test]
    async fn test_failed_status_fails_closed() {
        let client = GitClient::new(FixedRunner(CommandResult {
            stdout: "## main...origin/main [ahead 1, behind 1]\n M a.cs\n".to_string(),
            stderr: "fatal: something broke".to_string(),
            exit_code: 128,
        }));
        let dir = repo_dir();

        assert!(!client.is_ahead_of_upstream(dir.path()).await);
        assert!(!client.is_behind_upstream(dir.path()).await);
        assert!(!client.has_uncommitted_changes(dir.path()).await);
        assert!(client.list_changed_files(dir.path()).await.is_empty());
        assert!(client.current_branch(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn test_whitespace_status_means_clean() {
        let client = GitClient::new(FixedRunner(CommandResult::ok("  \n\t\n")));
        let dir = repo_dir();
        assert!(!client.has_uncommitted_changes(dir.path()).await);

        let client = GitClient::new(FixedRunner(CommandResult::ok(" M a.cs\n")));
        assert!(client.has_uncommitted_changes(dir.path()).await);
    }

    #[tokio::test]
    async fn test_inspect_non_root_does_not_run_git() {
        let client = GitClient::new(FixedRunner(CommandResult::ok(" M a.cs\n")));
        let dir = TempDir::new().unwrap();

        let state = client.inspect(dir.path()).await;
        assert!(!state.is_root);
        assert!(!state.has_uncommitted_changes);
        assert!(state.changed_files.is_empty());
    }
}
