use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for gitfolder
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Repository tree scanning
    #[serde(default)]
    pub scan: ScanConfig,

    /// Git executable settings
    #[serde(default)]
    pub git: GitConfig,

    /// Push behavior
    #[serde(default)]
    pub push: PushConfig,

    /// Where the push token comes from
    #[serde(default)]
    pub credential: CredentialConfig,

    /// Changelog generation
    #[serde(default)]
    pub changelog: ChangelogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Repository tree scanning configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Directory scanned by `sync-all` and `scan` when none is given
    #[serde(default = "default_scan_root")]
    pub root: String,

    /// Skip folders whose name starts with '.'
    #[serde(default = "default_true")]
    pub skip_hidden: bool,

    /// Also synchronize the repository enclosing the scan root
    #[serde(default = "default_true")]
    pub include_enclosing: bool,
}

/// Git executable configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Executable name or path
    #[serde(default = "default_git_program")]
    pub program: String,

    /// Timeout for a single git invocation in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Locale forced on every invocation
    #[serde(default = "default_locale")]
    pub locale: String,
}

/// Push configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PushConfig {
    /// Push SSH remotes with ambient SSH credentials instead of failing
    #[serde(default)]
    pub ssh_fallback: bool,
}

/// Credential lookup configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CredentialConfig {
    /// Environment variable holding the token
    #[serde(default = "default_credential_env")]
    pub env_var: String,

    /// File holding the token, consulted when the variable is unset
    #[serde(default)]
    pub file: Option<String>,
}

/// Changelog configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChangelogConfig {
    /// File written at the repository root
    #[serde(default = "default_changelog_file")]
    pub file_name: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact" or "full"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_scan_root() -> String {
    ".".to_string()
}
fn default_git_program() -> String {
    "git".to_string()
}
fn default_timeout() -> u64 {
    120
}
fn default_locale() -> String {
    "C".to_string()
}
fn default_credential_env() -> String {
    "GITFOLDER_TOKEN".to_string()
}
fn default_changelog_file() -> String {
    "CHANGELOG.md".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

// Default implementations
impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: default_scan_root(),
            skip_hidden: default_true(),
            include_enclosing: default_true(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            timeout: default_timeout(),
            locale: default_locale(),
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: default_credential_env(),
            file: None,
        }
    }
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            file_name: default_changelog_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("gitfolder").join("config.yml"))
    }

    /// Expand `~` and environment variables in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.scan.root = shellexpand::full(&self.scan.root)
            .context("Failed to expand scan.root path")?
            .into_owned();

        if let Some(file) = &self.credential.file {
            self.credential.file = Some(
                shellexpand::full(file)
                    .context("Failed to expand credential.file path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Scan root as a path
    pub fn scan_root(&self) -> PathBuf {
        PathBuf::from(&self.scan.root)
    }
}
