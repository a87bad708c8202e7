//! Error types for the git source.
//!
//! `SourceError` covers every way a load can fail. Credential problems get
//! their own `AuthError` so the resolver can tell an authentication failure
//! apart from a plain transport failure after libgit2 has flattened both into
//! a `git2::Error`.
//!
//! Mapping to the pipeline stages:
//! - `InvalidLocator`, `RepoNotFound` → local resolution
//! - `Clone`, `Auth`, `Cancelled`, `TimedOut`, `TempDir` → remote resolution
//! - `Git`, `TreeWalk` → history and index traversal

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Invalid repository locator: {0} looks like a remote address but does not match a supported form")]
    InvalidLocator(String),

    #[error("Failed to clone {url}: {message}")]
    Clone { url: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Clone of {0} was cancelled")]
    Cancelled(String),

    #[error("Clone of {url} timed out after {after:?}")]
    TimedOut { url: String, after: Duration },

    #[error("Failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("Failed to walk tree of commit {commit}: {source}")]
    TreeWalk {
        commit: String,
        #[source]
        source: git2::Error,
    },
}

/// Failures while deriving SSH credentials from the client configuration.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("cannot determine home directory for the SSH client configuration")]
    NoHomeDir,

    #[error("cannot read SSH config {path}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no Host entry in SSH config matches {0}")]
    HostNotFound(String),

    #[error("Host entry for {0} declares no IdentityFile")]
    NoIdentityFile(String),

    #[error("cannot extract a host from {0}")]
    InvalidUri(String),

    #[error("remote rejected key {0}")]
    Rejected(PathBuf),
}

pub type Result<T> = std::result::Result<T, SourceError>;
