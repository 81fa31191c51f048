//! Push target resolution
//!
//! A token is injected into the `origin` URL for a single push invocation.
//! The repository configuration is never touched, so the credential does not
//! land in `.git/config` or in shell history.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

use crate::error::GitError;
use crate::git::GitClient;
use crate::process::CommandRunner;

/// Transport family of a remote URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Https,
    Ssh,
    Other,
}

impl RemoteKind {
    pub fn classify(remote_url: &str) -> Self {
        let remote_url = remote_url.trim();
        let lower = remote_url.to_ascii_lowercase();

        if lower.starts_with("https://") {
            RemoteKind::Https
        } else if lower.starts_with("ssh://") || is_scp_like(remote_url) {
            RemoteKind::Ssh
        } else {
            RemoteKind::Other
        }
    }
}

// `git@host:org/repo.git` or an ssh config alias such as `work:org/repo.git`:
// a colon before any slash, not a drive letter
fn is_scp_like(remote_url: &str) -> bool {
    if remote_url.contains("://") {
        return false;
    }
    match remote_url.split_once(':') {
        Some((host, _)) => !host.is_empty() && !host.contains('/') && !is_drive_letter(host),
        None => false,
    }
}

fn is_drive_letter(host: &str) -> bool {
    host.len() == 1 && host.chars().all(|c| c.is_ascii_alphabetic())
}

/// HTTPS remote URL carrying a credential.
///
/// `Display` and `Debug` mask the credential; use [`AuthenticatedUrl::expose`]
/// only to build the command line.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedUrl(String);

impl AuthenticatedUrl {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthenticatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact_url(&self.0))
    }
}

impl fmt::Debug for AuthenticatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthenticatedUrl({})", self)
    }
}

/// Build an authenticated push URL from a remote URL and a token
pub fn authenticate_remote(
    remote_url: &str,
    credential: Option<&str>,
) -> Result<AuthenticatedUrl, GitError> {
    let remote_url = remote_url.trim();
    if remote_url.is_empty() {
        return Err(GitError::NoRemoteConfigured);
    }

    match RemoteKind::classify(remote_url) {
        RemoteKind::Ssh => Err(GitError::UnsupportedAuthScheme),
        RemoteKind::Other => Err(GitError::UnsupportedRemoteFormat(
            redact_url(remote_url).into_owned(),
        )),
        RemoteKind::Https => {
            let token = credential
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or(GitError::MissingCredential)?;

            let mut url = Url::parse(remote_url).map_err(|_| {
                GitError::UnsupportedRemoteFormat(redact_url(remote_url).into_owned())
            })?;
            if url.host_str().is_none() {
                return Err(GitError::UnsupportedRemoteFormat(
                    redact_url(remote_url).into_owned(),
                ));
            }

            // Replaces any user-info already present in the remote.
            url.set_password(None)
                .and_then(|_| url.set_username(token))
                .map_err(|_| {
                    GitError::UnsupportedRemoteFormat(redact_url(remote_url).into_owned())
                })?;
            url.set_fragment(None);

            Ok(AuthenticatedUrl(url.into()))
        }
    }
}

/// Mask the user-info part of a URL-looking string
pub fn redact_url(text: &str) -> Cow<'_, str> {
    let Some(scheme_end) = text.find("://") else {
        return Cow::Borrowed(text);
    };
    let authority_start = scheme_end + 3;
    let rest = &text[authority_start..];
    let authority_end = rest.find('/').unwrap_or(rest.len());

    match rest[..authority_end].rfind('@') {
        Some(at) => Cow::Owned(format!(
            "{}***{}",
            &text[..authority_start],
            &rest[at..]
        )),
        None => Cow::Borrowed(text),
    }
}

impl<R: CommandRunner> GitClient<R> {
    /// URL of the `origin` remote, `None` when it is missing or empty
    pub async fn origin_url(&self, path: &Path) -> Option<String> {
        let result = self.run(path, &["remote", "get-url", "origin"]).await;
        let url = result.stdout.trim();

        if !result.success() || url.is_empty() {
            debug!(
                "No origin remote in {}: {}",
                path.display(),
                result.first_line()
            );
            return None;
        }

        Some(url.to_string())
    }

    /// Resolve the authenticated URL to push `HEAD` of `path` to
    pub async fn resolve_push_target(
        &self,
        path: &Path,
        credential: Option<&str>,
    ) -> Result<AuthenticatedUrl, GitError> {
        let remote_url = self
            .origin_url(path)
            .await
            .ok_or(GitError::NoRemoteConfigured)?;

        authenticate_remote(&remote_url, credential).map_err(|e| {
            warn!("Cannot push {}: {}", path.display(), e);
            e
        })
    }
}
