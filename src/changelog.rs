//! Changelog generation from the commit log

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::GitError;
use crate::git::{is_repository_root, GitClient};
use crate::process::CommandRunner;

const LOG_FORMAT: &str = "--pretty=format:%ad - %h - %s";

/// Render `git log` output as a changelog document
pub fn render_changelog(
    repository: &Path,
    branch: &str,
    generated_at: DateTime<Utc>,
    log_output: &str,
) -> String {
    let mut out = String::from("# Changelog\n\n");
    out.push_str(&format!("Repository: {}\n", repository.display()));
    out.push_str(&format!("Branch: {}\n", branch));
    out.push_str(&format!(
        "Generated: {}\n\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    for line in log_output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        // subjects may themselves contain " - "
        let mut parts = line.splitn(3, " - ");
        match (parts.next(), parts.next(), parts.next()) {
            (Some(date), Some(hash), Some(subject)) => {
                out.push_str(&format!("- {} \u{2014} {} \u{2014} {}\n", date, hash, subject));
            }
            _ => out.push_str(&format!("- {}\n", line)),
        }
    }

    out
}

impl<R: CommandRunner> GitClient<R> {
    /// Write the changelog of `path` to `file_name` at the repository root
    pub async fn generate_changelog(&self, path: &Path, file_name: &str) -> Result<PathBuf> {
        if !is_repository_root(path) {
            return Err(GitError::NotARepository(path.to_path_buf()).into());
        }

        let log = self
            .run(path, &["log", "--date=iso-strict", LOG_FORMAT])
            .await;
        if let Some(error) = log.to_error("log") {
            return Err(error.into());
        }

        let branch = self
            .current_branch(path)
            .await
            .unwrap_or_else(|| "HEAD".to_string());
        let content = render_changelog(path, &branch, Utc::now(), &log.stdout);

        let target = path.join(file_name);
        std::fs::write(&target, content)
            .with_context(|| format!("Failed to write changelog: {:?}", target))?;

        info!("Wrote changelog to {}", target.display());
        Ok(target)
    }
}
