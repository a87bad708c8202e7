use std::cell::RefCell;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use git2::build::RepoBuilder;
use git2::{CertificateCheckStatus, FetchOptions, RemoteCallbacks, Repository, RepositoryOpenFlags};
use tempfile::TempDir;

use crate::error::{AuthError, Result, SourceError};
use crate::git::credentials::{CredentialResolver, CredentialSession};
use crate::git::locator::{Location, LocationKind};
use crate::models::{GitLoadOptions, HostKeyPolicy};

const CLONE_DIR_PREFIX: &str = "seekret";
/// How often a waiting caller re-checks the cancel token and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag a caller flips to abort an in-flight clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloneSettings {
    pub host_key_policy: HostKeyPolicy,
    pub timeout: Option<Duration>,
    pub ssh_config: Option<PathBuf>,
    pub cancel: CancelToken,
}

impl CloneSettings {
    pub fn from_options(opt: &GitLoadOptions, cancel: CancelToken) -> Self {
        Self {
            host_key_policy: opt.host_key_policy,
            timeout: opt.clone_timeout,
            ssh_config: opt.ssh_config.clone(),
            cancel,
        }
    }
}

/// An opened repository, owned for the duration of one load.
///
/// For remote sources the working copy lives in a temporary directory that is
/// removed when the handle is dropped. Field order matters: the repository is
/// closed before its directory goes away.
pub struct RepoHandle {
    repo: Repository,
    location: Location,
    workdir: Option<TempDir>,
}

impl RepoHandle {
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Temporary clone directory, `None` for local repositories.
    pub fn clone_dir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(|d| d.path())
    }
}

pub fn resolve(location: &Location, settings: &CloneSettings) -> Result<RepoHandle> {
    if location.is_remote() {
        clone_remote(&location.value, settings)
    } else {
        open_local(location)
    }
}

/// Opens the repository at or above `location`, crossing filesystem boundaries.
pub fn open_local(location: &Location) -> Result<RepoHandle> {
    let path = location.value.as_str();
    let repo = Repository::open_ext(path, RepositoryOpenFlags::CROSS_FS, &[] as &[&OsStr])
        .map_err(|err| {
            tracing::debug!("Open of {} failed: {}", path, err.message());
            if location.looks_remote() {
                SourceError::InvalidLocator(path.to_string())
            } else {
                SourceError::RepoNotFound(path.to_string())
            }
        })?;

    tracing::info!("Opened git repository at: {}", repo.path().display());

    Ok(RepoHandle {
        repo,
        location: location.clone(),
        workdir: None,
    })
}

/// Why a clone worker stopped without a repository.
enum CloneFailure {
    /// A progress callback saw the abort flag.
    Aborted,
    Auth(AuthError),
    Git(git2::Error),
}

/// Everything the clone worker needs, owned so it can move to another thread.
struct CloneJob {
    url: String,
    into: PathBuf,
    host_key_policy: HostKeyPolicy,
    ssh_config: Option<PathBuf>,
    abort: Arc<AtomicBool>,
}

impl CloneJob {
    fn run(self) -> std::result::Result<Repository, CloneFailure> {
        let session = RefCell::new(CredentialSession::new(CredentialResolver::new(
            self.ssh_config.clone(),
        )));

        // Returning false from a progress callback makes libgit2 stop the transfer.
        let keep_going = || !self.abort.load(Ordering::SeqCst);

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|cred_url, username_from_url, allowed| {
            session
                .borrow_mut()
                .credential(cred_url, username_from_url, allowed)
        });
        callbacks.transfer_progress(|_progress| keep_going());
        callbacks.sideband_progress(|_data| keep_going());
        if self.host_key_policy == HostKeyPolicy::AcceptAll {
            callbacks.certificate_check(|_cert, host| {
                tracing::debug!("Accepting host key of {} without verification", host);
                Ok(CertificateCheckStatus::CertificateOk)
            });
        }

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch);

        let result = builder.clone(&self.url, &self.into);
        match result {
            Ok(repo) => Ok(repo),
            Err(_) if self.abort.load(Ordering::SeqCst) => Err(CloneFailure::Aborted),
            Err(err) => {
                let failure = session.borrow_mut().take_failure();
                Err(match failure {
                    Some(auth) => CloneFailure::Auth(auth),
                    None => CloneFailure::Git(err),
                })
            }
        }
    }
}

/// Full clone of `url` into a fresh temporary directory.
///
/// The clone runs on a worker thread while the caller waits for it, so the
/// cancel token and `settings.timeout` are honoured even while libgit2 is
/// blocked connecting or waiting on a silent server. An abandoned worker is
/// told to stop at its next progress callback and its directory is removed
/// here; a worker stuck in a read exits when the connection closes.
pub fn clone_remote(url: &str, settings: &CloneSettings) -> Result<RepoHandle> {
    if settings.cancel.is_cancelled() {
        return Err(SourceError::Cancelled(url.to_string()));
    }

    let workdir = tempfile::Builder::new()
        .prefix(CLONE_DIR_PREFIX)
        .tempdir()
        .map_err(SourceError::TempDir)?;

    let abort = Arc::new(AtomicBool::new(false));
    let job = CloneJob {
        url: url.to_string(),
        into: workdir.path().to_path_buf(),
        host_key_policy: settings.host_key_policy,
        ssh_config: settings.ssh_config.clone(),
        abort: Arc::clone(&abort),
    };

    tracing::info!("Cloning {} into {}", url, workdir.path().display());
    let started = Instant::now();

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("git-clone".into())
        .spawn(move || {
            // The receiver is gone when the caller gave up; nothing to report to.
            let _ = tx.send(job.run());
        })
        .map_err(|err| SourceError::Clone {
            url: url.to_string(),
            message: format!("failed to start clone worker: {}", err),
        })?;

    let outcome = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(outcome) => break outcome,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SourceError::Clone {
                    url: url.to_string(),
                    message: "clone worker exited without a result".to_string(),
                });
            }
        }

        if settings.cancel.is_cancelled() {
            abort.store(true, Ordering::SeqCst);
            tracing::info!("Clone of {} cancelled after {:?}", url, started.elapsed());
            return Err(SourceError::Cancelled(url.to_string()));
        }
        if settings.timeout.is_some_and(|limit| started.elapsed() >= limit) {
            abort.store(true, Ordering::SeqCst);
            tracing::warn!("Clone of {} timed out after {:?}", url, started.elapsed());
            return Err(SourceError::TimedOut {
                url: url.to_string(),
                after: started.elapsed(),
            });
        }
    };

    let repo = match outcome {
        Ok(repo) => repo,
        Err(CloneFailure::Aborted) => return Err(SourceError::Cancelled(url.to_string())),
        Err(CloneFailure::Auth(auth)) => return Err(SourceError::Auth(auth)),
        Err(CloneFailure::Git(err)) => {
            return Err(SourceError::Clone {
                url: url.to_string(),
                message: err.message().to_string(),
            });
        }
    };

    tracing::info!("Cloned {} in {:?}", url, started.elapsed());

    Ok(RepoHandle {
        repo,
        location: Location {
            kind: LocationKind::Remote,
            value: url.to_string(),
        },
        workdir: Some(workdir),
    })
}
