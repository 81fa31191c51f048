//! gitfolder - Commit, push and sync every git repository in a project tree
//!
//! gitfolder drives the `git` executable to keep a folder's repositories in
//! step with their remotes: inspect state, commit (with a placeholder message
//! when none is given), push with a token over HTTPS, fetch and pull, and
//! sweep every repository under a directory in one pass.
//!
//! ## Modules
//!
//! - [`process`]: bounded, locale-stable git invocations
//! - [`git`]: read-only repository state queries
//! - [`remote`]: authenticated push URL resolution
//! - [`synchronizer`]: commit, push, fetch and pull for one repository
//! - [`discovery`]: repository roots under a directory tree
//! - [`sync`]: batch sweep with progress and cancellation
//! - [`credentials`]: push token lookup
//! - [`changelog`]: changelog file generation
//! - [`config`]: YAML configuration with XDG compliance
//! - [`health`]: preflight diagnostics

pub mod changelog;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod git;
pub mod health;
pub mod process;
pub mod remote;
pub mod sync;
pub mod synchronizer;

pub use config::Config;
pub use credentials::{resolve_credential, Credential, CredentialSource};
pub use discovery::RepoScanner;
pub use error::GitError;
pub use git::{ChangeEntry, GitClient, RepoState, StatusLabel};
pub use health::HealthCheck;
pub use process::{CommandResult, CommandRunner, GitProcess};
pub use remote::{AuthenticatedUrl, RemoteKind};
pub use sync::{BatchReport, CancelFlag, SyncEngine, SyncHandle, SyncOutcome, SyncProgress};
pub use synchronizer::{CommitPushFetch, RepoSynchronizer, SyncStage};
