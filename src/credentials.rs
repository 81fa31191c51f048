//! Push credential lookup
//!
//! The core never reads a store itself: callers resolve a [`Credential`] here
//! and pass the exposed value into push operations. Implementations must never
//! log or include the secret in error messages.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::config::CredentialConfig;

/// Access token for HTTPS pushes
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for blank values
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Somewhere a credential may be found
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` when this source holds no credential
    fn load(&self) -> Result<Option<Credential>>;

    /// Where the credential comes from, for diagnostics
    fn describe(&self) -> String;
}

/// Token from an environment variable
#[derive(Debug, Clone)]
pub struct EnvCredential {
    pub var: String,
}

impl CredentialSource for EnvCredential {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(std::env::var(&self.var).ok().and_then(Credential::new))
    }

    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }
}

/// Token stored as the contents of a file
#[derive(Debug, Clone)]
pub struct FileCredential {
    pub path: PathBuf,
}

impl CredentialSource for FileCredential {
    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credential file: {:?}", self.path))?;
        Ok(Credential::new(content))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Configured sources in lookup order: environment first, then file
pub fn sources_from_config(config: &CredentialConfig) -> Vec<Box<dyn CredentialSource>> {
    let mut sources: Vec<Box<dyn CredentialSource>> = vec![Box::new(EnvCredential {
        var: config.env_var.clone(),
    })];

    if let Some(file) = &config.file {
        sources.push(Box::new(FileCredential {
            path: PathBuf::from(file),
        }));
    }

    sources
}

/// First credential found in the configured sources
pub fn resolve_credential(config: &CredentialConfig) -> Result<Option<Credential>> {
    for source in sources_from_config(config) {
        if let Some(credential) = source.load()? {
            debug!("Using credential from {}", source.describe());
            return Ok(Some(credential));
        }
    }

    debug!("No credential configured");
    Ok(None)
}
