//! Source locator classification.
//!
//! Recognized remote forms:
//! - `<proto>://<host>/<org>/<repo>.git` with proto one of http, https, git, ssh
//! - `git@<host>:<org>/<repo>.git` (scp-like, canonicalized to `ssh://git@...`)
//!
//! Anything else is a local path and passes through untouched.

use std::sync::LazyLock;

use regex::Regex;

static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(https?|git|ssh)://|(git@))([^:|/]+)(?:/|:)([^/]+)/([^/.]+)\.git$")
        .expect("remote locator pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub kind: LocationKind,
    /// Local path as given, or the canonical remote URI
    pub value: String,
}

impl Location {
    pub fn parse(raw: &str) -> Self {
        let (value, remote) = normalize(raw);
        let kind = if remote {
            LocationKind::Remote
        } else {
            LocationKind::Local
        };
        Self { kind, value }
    }

    pub fn is_remote(&self) -> bool {
        self.kind == LocationKind::Remote
    }

    /// True for a local location whose text still resembles a remote address,
    /// e.g. `https://host/repo` without the `.git` suffix.
    pub fn looks_remote(&self) -> bool {
        self.kind == LocationKind::Local
            && (self.value.contains("://") || self.value.starts_with("git@"))
    }
}

/// Returns the canonical form of `source` and whether it names a remote repository.
pub fn normalize(source: &str) -> (String, bool) {
    let Some(caps) = REMOTE_RE.captures(source) else {
        return (source.to_string(), false);
    };

    let proto = caps.get(1).map_or("ssh", |m| m.as_str());
    let host_prefix = caps.get(2).map_or("", |m| m.as_str());
    let host = &caps[3];
    let org = &caps[4];
    let repo = &caps[5];

    (
        format!("{}://{}{}/{}/{}.git", proto, host_prefix, host, org, repo),
        true,
    )
}
