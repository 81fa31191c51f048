//! Preflight checks for `gitfolder doctor`
//!
//! Verifies git can be launched, a push credential is available, and the
//! scan root exists before a sweep is attempted.

use std::path::Path;

use crate::config::Config;
use crate::credentials::{resolve_credential, sources_from_config};
use crate::discovery::RepoScanner;
use crate::process::{CommandRunner, GitProcess};

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git executable status
    pub git: CheckResult,
    /// Push credential (warning only, SSH remotes need none)
    pub credential: CheckResult,
    /// Scan root status
    pub scan_root: CheckResult,
    /// Repository enclosing the scan root (warning only)
    pub enclosing: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    pub fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::ok(message)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::ok(message)
        }
    }

    pub fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::error(message)
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            is_warning: true,
            ..Self::ok(message)
        }
    }

    pub fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::warning(message)
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        let scan_root = config.scan_root();

        Self {
            git: Self::check_git(&GitProcess::from_config(&config.git)).await,
            credential: Self::check_credential(config),
            scan_root: Self::check_scan_root(&scan_root),
            enclosing: Self::check_enclosing(&scan_root),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.all_checks()
            .iter()
            .all(|(_, result)| result.passed)
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check the configured git executable runs
    async fn check_git(process: &GitProcess) -> CheckResult {
        let cwd = std::env::temp_dir();
        let result = process.run(&cwd, &["--version"]).await;

        if result.success() {
            CheckResult::ok_with_details("Git installed", result.stdout.trim().to_string())
        } else {
            CheckResult::error_with_details(
                format!("Cannot run '{}'", process.program()),
                format!(
                    "{}\nInstall git: https://git-scm.com/downloads",
                    result.first_line()
                ),
            )
        }
    }

    /// Check a push credential is configured (never shows its value)
    fn check_credential(config: &Config) -> CheckResult {
        let searched = sources_from_config(&config.credential)
            .iter()
            .map(|source| source.describe())
            .collect::<Vec<_>>()
            .join(", ");

        match resolve_credential(&config.credential) {
            Ok(Some(_)) => CheckResult::ok_with_details("Push credential configured", searched),
            Ok(None) => CheckResult::warning_with_details(
                "No push credential found",
                format!(
                    "HTTPS pushes will fail. Searched: {}\nRun: export {}=<token>",
                    searched, config.credential.env_var
                ),
            ),
            Err(e) => CheckResult::error_with_details("Cannot read push credential", e.to_string()),
        }
    }

    /// Check the scan root exists
    fn check_scan_root(path: &Path) -> CheckResult {
        if path.is_dir() {
            CheckResult::ok_with_details("Scan root exists", path.display().to_string())
        } else {
            CheckResult::error_with_details(
                "Scan root is not a directory",
                format!("Set scan.root in the config or pass a directory: {}", path.display()),
            )
        }
    }

    /// Look for the repository enclosing the scan root (warning only)
    fn check_enclosing(path: &Path) -> CheckResult {
        match RepoScanner::new().find_enclosing_repository_root(path) {
            Some(root) => {
                CheckResult::ok_with_details("Enclosing repository found", root.display().to_string())
            }
            None => CheckResult::warning_with_details(
                "Scan root is not inside a repository",
                "Only repositories below the scan root will be synchronized",
            ),
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Executable", &self.git),
            ("Push Credential", &self.credential),
            ("Scan Root", &self.scan_root),
            ("Enclosing Repository", &self.enclosing),
        ]
    }
}
