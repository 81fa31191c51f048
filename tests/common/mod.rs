//! Common test utilities and helpers for gitfolder tests
#![allow(dead_code)]

use async_trait::async_trait;
use gitfolder::{CommandResult, CommandRunner};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;

/// Fake runner answering from a script keyed by repository folder name and
/// command line. Lookup order: repo + full command, repo + subcommand, full
/// command, subcommand; anything unscripted succeeds with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    per_repo: HashMap<(String, String), CommandResult>,
    any_repo: HashMap<String, CommandResult>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, command: &str, result: CommandResult) -> Self {
        self.any_repo.insert(command.to_string(), result);
        self
    }

    pub fn on_repo(mut self, repo: &str, command: &str, result: CommandResult) -> Self {
        self.per_repo
            .insert((repo.to_string(), command.to_string()), result);
        self
    }

    /// Every call as (repo folder name, command line)
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Subcommands run in one repository, in order
    pub fn subcommands_for(&self, repo: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(name, _)| name == repo)
            .map(|(_, command)| command.split(' ').next().unwrap_or("").to_string())
            .collect()
    }

    fn lookup(&self, repo: &str, full: &str, first: &str) -> Option<CommandResult> {
        let key = |command: &str| (repo.to_string(), command.to_string());
        self.per_repo
            .get(&key(full))
            .or_else(|| self.per_repo.get(&key(first)))
            .or_else(|| self.any_repo.get(full))
            .or_else(|| self.any_repo.get(first))
            .cloned()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, working_dir: &Path, args: &[&str]) -> CommandResult {
        let repo = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let full = args.join(" ");
        let first = args.first().copied().unwrap_or("");

        self.calls.lock().unwrap().push((repo.clone(), full.clone()));
        self.lookup(&repo, &full, first)
            .unwrap_or_else(|| CommandResult::ok(""))
    }
}

/// Directory with an empty `.git` folder, enough for root detection
pub fn fake_repo(parent: &Path, name: &str) -> PathBuf {
    let path = parent.join(name);
    std::fs::create_dir_all(path.join(".git")).expect("Failed to create fake repo");
    path
}

/// Run git in `dir`, panicking with its stderr on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .expect("Failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Fresh repository on branch `main` with a test identity
pub fn init_repo(path: &Path) -> PathBuf {
    std::fs::create_dir_all(path).expect("Failed to create repo dir");
    git(path, &["init", "-q"]);
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    configure_identity(path);
    path.to_path_buf()
}

/// Write a file and commit it
pub fn commit_file(repo: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(repo.join(name), content).expect("Failed to write file");
    git(repo, &["add", name]);
    git(repo, &["commit", "-q", "-m", message]);
}

/// A bare remote plus two clones tracking `main`
pub struct RemoteFixture {
    pub temp_dir: TempDir,
    pub remote: PathBuf,
    pub local: PathBuf,
    pub other: PathBuf,
}

impl RemoteFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let remote = temp_dir.path().join("remote.git");
        std::fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "-q", "--bare"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let local = init_repo(&temp_dir.path().join("local"));
        commit_file(&local, "README.md", "hello\n", "Initial commit");
        git(&local, &["remote", "add", "origin", &remote.to_string_lossy()]);
        git(&local, &["push", "-q", "-u", "origin", "main"]);

        let other = temp_dir.path().join("other");
        git(
            temp_dir.path(),
            &["clone", "-q", &remote.to_string_lossy(), "other"],
        );
        configure_identity(&other);

        Self {
            temp_dir,
            remote,
            local,
            other,
        }
    }
}
