//! Repository tree discovery
//!
//! Finds independent repository roots below a directory, plus the repository
//! that encloses it. A recorded root is never descended into, so a nested
//! repository is only found when the scan starts inside it.

use anyhow::{bail, Context, Result};
use path_clean::PathClean;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::git::is_repository_root;

/// Filesystem scanner for repository roots
#[derive(Debug, Clone)]
pub struct RepoScanner {
    skip_hidden: bool,
}

impl Default for RepoScanner {
    fn default() -> Self {
        Self { skip_hidden: true }
    }
}

impl RepoScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            skip_hidden: config.skip_hidden,
        }
    }

    pub fn with_skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }

    /// All repository roots at or below `start`, in sorted traversal order.
    ///
    /// Symlinked directories are not followed and unreadable directories are
    /// skipped with a warning.
    pub fn find_repository_roots(&self, start: &Path) -> Result<Vec<PathBuf>> {
        if !start.is_dir() {
            bail!("Scan root is not a directory: {}", start.display());
        }

        let start = normalize_path(start);
        debug!("Scanning for repositories under {}", start.display());

        let mut roots = Vec::new();
        let mut stack = vec![start];

        while let Some(dir) = stack.pop() {
            if dir.file_name().is_some_and(|name| name == ".git") {
                continue;
            }

            if is_repository_root(&dir) {
                debug!("Found repository: {}", dir.display());
                roots.push(dir);
                continue;
            }

            let mut children = match self.child_directories(&dir) {
                Ok(children) => children,
                Err(e) => {
                    warn!("Failed to enumerate {}: {:#}", dir.display(), e);
                    continue;
                }
            };

            // reversed so the stack pops in name order
            children.sort();
            stack.extend(children.into_iter().rev());
        }

        Ok(roots)
    }

    /// Nearest repository root at or above `start`
    pub fn find_enclosing_repository_root(&self, start: &Path) -> Option<PathBuf> {
        let mut visited = HashSet::new();
        let mut current = Some(normalize_path(start));

        while let Some(dir) = current {
            if !visited.insert(dir.clone()) {
                warn!("Path cycle while walking up from {}", start.display());
                break;
            }
            if is_repository_root(&dir) {
                return Some(dir);
            }
            current = dir.parent().map(Path::to_path_buf);
        }

        None
    }

    /// Roots to synchronize for `start`: everything found below it, then the
    /// enclosing repository unless it was already found.
    pub fn sync_roots(&self, start: &Path, include_enclosing: bool) -> Result<Vec<PathBuf>> {
        let mut roots = self
            .find_repository_roots(start)
            .with_context(|| format!("Failed to scan {}", start.display()))?;

        if include_enclosing {
            if let Some(enclosing) = self.find_enclosing_repository_root(start) {
                if !roots.contains(&enclosing) {
                    debug!("Including enclosing repository {}", enclosing.display());
                    roots.push(enclosing);
                }
            }
        }

        Ok(roots)
    }

    fn child_directories(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut children = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            // file_type does not follow symlinks
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if self.skip_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            children.push(entry.path());
        }

        Ok(children)
    }
}

/// Absolute form of `path` used for comparisons: canonical when possible,
/// lexically cleaned otherwise
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute.clean()
}

/// Short label for a repository: its folder name, or the full path
pub fn repository_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_repo(path: &Path) {
        std::fs::create_dir_all(path.join(".git")).unwrap();
    }

    #[test]
    fn test_missing_start_is_error() {
        let dir = TempDir::new().unwrap();
        let result = RepoScanner::new().find_repository_roots(&dir.path().join("nope"));
        assert!(result.is_err());
    }

    #[test]
    fn test_hidden_folders_are_skipped() {
        let dir = TempDir::new().unwrap();
        make_repo(&dir.path().join(".hidden/repo"));
        make_repo(&dir.path().join("visible/repo"));

        let roots = RepoScanner::new().find_repository_roots(dir.path()).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].ends_with("visible/repo"));

        let roots = RepoScanner::new()
            .with_skip_hidden(false)
            .find_repository_roots(dir.path())
            .unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn test_git_internals_are_not_scanned() {
        let dir = TempDir::new().unwrap();
        make_repo(&dir.path().join("Game/.git/modules/Shared"));

        let roots = RepoScanner::new()
            .with_skip_hidden(false)
            .find_repository_roots(&dir.path().join("Game/.git"))
            .unwrap();
        assert!(roots.is_empty());
    }

    #[test]
    fn test_results_are_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["zeta", "alpha", "mid/beta"] {
            make_repo(&dir.path().join(name));
        }

        let roots = RepoScanner::new().find_repository_roots(dir.path()).unwrap();
        let names: Vec<_> = roots.iter().map(|r| repository_label(r)).collect();
        assert_eq!(names, vec!["alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_enclosing_root_includes_start() {
        let dir = TempDir::new().unwrap();
        make_repo(dir.path());
        let assets = dir.path().join("Assets/Scripts");
        std::fs::create_dir_all(&assets).unwrap();

        let scanner = RepoScanner::new();
        assert_eq!(
            scanner.find_enclosing_repository_root(&assets),
            Some(normalize_path(dir.path()))
        );
        assert_eq!(
            scanner.find_enclosing_repository_root(dir.path()),
            Some(normalize_path(dir.path()))
        );
    }

    #[test]
    fn test_sync_roots_puts_enclosing_last() {
        let dir = TempDir::new().unwrap();
        make_repo(dir.path());
        let assets = dir.path().join("Assets");
        make_repo(&assets.join("Plugins/Shared"));
        make_repo(&assets.join("Packages/Tools"));

        let roots = RepoScanner::new().sync_roots(&assets, true).unwrap();
        let names: Vec<_> = roots.iter().map(|r| repository_label(r)).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[..2], ["Tools", "Shared"]);
        assert_eq!(roots[2], normalize_path(dir.path()));

        let roots = RepoScanner::new().sync_roots(&assets, false).unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn test_enclosing_root_is_not_duplicated() {
        let dir = TempDir::new().unwrap();
        make_repo(dir.path());

        let roots = RepoScanner::new().sync_roots(dir.path(), true).unwrap();
        assert_eq!(roots, vec![normalize_path(dir.path())]);
    }

    #[test]
    fn test_normalize_path_cleans_missing_paths() {
        let dir = TempDir::new().unwrap();
        let messy = dir.path().join("a/../b/./c");
        let cleaned = normalize_path(&messy);
        assert!(cleaned.is_absolute());
        assert!(cleaned.ends_with("b/c"));
    }

    #[test]
    fn test_repository_label() {
        assert_eq!(repository_label(Path::new("/work/Game")), "Game");
        assert_eq!(repository_label(Path::new("/")), "/");
    }
}
