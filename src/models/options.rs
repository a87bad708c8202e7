//! Load options.
//!
//! Hosts pass a loose key/value map; `GitLoadOptions::from_options` picks out
//! the keys this source understands. Unknown keys and values of the wrong type
//! are ignored and the default is kept.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

/// Option map as supplied by the host.
pub type LoadOptions = serde_json::Map<String, Value>;

pub const COMMIT_FILES: &str = "commit-files";
pub const COMMIT_MESSAGES: &str = "commit-messages";
pub const STAGED_FILES: &str = "staged-files";
pub const COMMIT_COUNT: &str = "commit-count";
pub const ACCEPT_ANY_HOST_KEY: &str = "accept-any-host-key";
pub const CLONE_TIMEOUT: &str = "clone-timeout";
pub const SSH_CONFIG: &str = "ssh-config";
pub const STRICT_TREE_WALK: &str = "strict-tree-walk";

/// How the transport treats the server's certificate or host key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Leave the decision to libgit2's own validation.
    #[default]
    Verify,
    /// Accept whatever the server presents.
    AcceptAll,
}

/// What happens when one commit's tree cannot be walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeErrorPolicy {
    /// Log, record in the skipped list, continue with the next entry.
    #[default]
    Skip,
    /// Abort the extraction with the error.
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitLoadOptions {
    pub commit_files: bool,
    pub commit_messages: bool,
    pub staged_files: bool,
    /// Number of most recent commits to visit; 0 visits the whole history.
    pub commit_count: usize,

    pub host_key_policy: HostKeyPolicy,
    pub clone_timeout: Option<Duration>,
    pub ssh_config: Option<PathBuf>,
    pub tree_errors: TreeErrorPolicy,
}

impl GitLoadOptions {
    pub fn from_options(options: &LoadOptions) -> Self {
        let mut opt = Self::default();

        for (key, value) in options {
            let applied = match key.as_str() {
                COMMIT_FILES => value.as_bool().map(|v| opt.commit_files = v),
                COMMIT_MESSAGES => value.as_bool().map(|v| opt.commit_messages = v),
                STAGED_FILES => value.as_bool().map(|v| opt.staged_files = v),
                COMMIT_COUNT => value
                    .as_i64()
                    .map(|v| opt.commit_count = usize::try_from(v).unwrap_or(0)),
                ACCEPT_ANY_HOST_KEY => value.as_bool().map(|v| {
                    opt.host_key_policy = if v {
                        HostKeyPolicy::AcceptAll
                    } else {
                        HostKeyPolicy::Verify
                    }
                }),
                CLONE_TIMEOUT => value
                    .as_u64()
                    .filter(|secs| *secs > 0)
                    .map(|secs| opt.clone_timeout = Some(Duration::from_secs(secs))),
                SSH_CONFIG => value
                    .as_str()
                    .map(|path| opt.ssh_config = Some(PathBuf::from(path))),
                STRICT_TREE_WALK => value.as_bool().map(|v| {
                    opt.tree_errors = if v {
                        TreeErrorPolicy::Fail
                    } else {
                        TreeErrorPolicy::Skip
                    }
                }),
                _ => None,
            };

            if applied.is_none() {
                tracing::debug!("Ignoring load option {}={}", key, value);
            }
        }

        opt
    }

    /// Whether the commit history needs to be walked at all.
    pub fn wants_history(&self) -> bool {
        self.commit_files || self.commit_messages
    }
}
