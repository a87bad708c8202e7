//! SSH credentials from the user's SSH client configuration.
//!
//! The key for a remote host comes from the `IdentityFile` of the first
//! `Host` block in `~/.ssh/config` matching that host. The public key is
//! expected next to it with a `.pub` suffix. Nothing here aborts the process:
//! every failure is an `AuthError` that ends up in the clone error.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{Cred, CredentialType};
use globset::{GlobBuilder, GlobMatcher};

use crate::error::AuthError;

const DEFAULT_USERNAME: &str = "git";
const PUBLIC_KEY_SUFFIX: &str = ".pub";

#[derive(Debug, Clone)]
struct HostPattern {
    negated: bool,
    matcher: GlobMatcher,
}

impl HostPattern {
    /// `None` for a pattern globset cannot compile; it never matches.
    fn compile(pattern: &str) -> Option<Self> {
        let (negated, glob) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        match GlobBuilder::new(glob).case_insensitive(true).build() {
            Ok(glob) => Some(Self {
                negated,
                matcher: glob.compile_matcher(),
            }),
            Err(e) => {
                tracing::warn!("Ignoring SSH host pattern '{}': {}", pattern, e);
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<HostPattern>,
    /// (lowercased keyword, value)
    params: Vec<(String, String)>,
}

impl HostBlock {
    fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| HostPattern::compile(p))
                .collect(),
            params: Vec::new(),
        }
    }

    /// A negated pattern that matches rules the block out, whatever else matches.
    fn matches(&self, host: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if pattern.matcher.is_match(host) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed `ssh_config(5)` file. Only `Host` blocks are understood; `Match`
/// blocks are kept but never match.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    blocks: Vec<HostBlock>,
}

impl SshConfig {
    pub fn parse(text: &str) -> Self {
        // Options before the first Host line apply to every host.
        let mut blocks = vec![HostBlock::new(&["*".to_string()])];

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((keyword, value)) = split_keyword(line) else {
                continue;
            };
            let keyword = keyword.to_ascii_lowercase();

            if keyword == "host" {
                let patterns: Vec<String> = value.split_whitespace().map(unquote).collect();
                blocks.push(HostBlock::new(&patterns));
            } else if keyword == "match" {
                blocks.push(HostBlock::new(&[]));
            } else if let Some(block) = blocks.last_mut() {
                block.params.push((keyword, unquote(value)));
            }
        }

        Self { blocks }
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let text = fs::read_to_string(path).map_err(|source| AuthError::ConfigUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// `$HOME/.ssh/config`
    pub fn default_path() -> Result<PathBuf, AuthError> {
        let home = dirs::home_dir().ok_or(AuthError::NoHomeDir)?;
        Ok(home.join(".ssh").join("config"))
    }

    /// Whether any explicit `Host` block (not the implicit global one) matches.
    pub fn has_host(&self, host: &str) -> bool {
        self.blocks.iter().skip(1).any(|b| b.matches(host))
    }

    /// First value of `key` among the blocks matching `host`, in file order.
    pub fn param(&self, host: &str, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.blocks
            .iter()
            .filter(|b| b.matches(host))
            .find_map(|b| b.param(&key))
    }
}

/// Key pair offered to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    pub username: String,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl SshKeyPair {
    pub fn to_cred(&self) -> Result<Cred, git2::Error> {
        Cred::ssh_key(
            &self.username,
            Some(self.public_key.as_path()),
            &self.private_key,
            None,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    config_path: Option<PathBuf>,
}

impl CredentialResolver {
    /// `config_path` overrides `$HOME/.ssh/config`.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    fn load_config(&self) -> Result<SshConfig, AuthError> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => SshConfig::default_path()?,
        };
        SshConfig::load(&path)
    }

    /// Key pair for the host of `url`.
    pub fn resolve(&self, url: &str, username_from_url: Option<&str>) -> Result<SshKeyPair, AuthError> {
        let config = self.load_config()?;
        key_pair_for(&config, url, username_from_url)
    }
}

fn key_pair_for(
    config: &SshConfig,
    url: &str,
    username_from_url: Option<&str>,
) -> Result<SshKeyPair, AuthError> {
    let host = host_of(url).ok_or_else(|| AuthError::InvalidUri(url.to_string()))?;

    if !config.has_host(host) {
        return Err(AuthError::HostNotFound(host.to_string()));
    }

    let identity = config
        .param(host, "IdentityFile")
        .ok_or_else(|| AuthError::NoIdentityFile(host.to_string()))?;
    let private_key = expand_tilde(identity);
    let mut public_key = private_key.clone().into_os_string();
    public_key.push(PUBLIC_KEY_SUFFIX);

    let username = username_from_url
        .or_else(|| config.param(host, "User"))
        .unwrap_or(DEFAULT_USERNAME)
        .to_string();

    tracing::debug!("Using key {} for {}@{}", private_key.display(), username, host);

    Ok(SshKeyPair {
        username,
        private_key,
        public_key: PathBuf::from(public_key),
    })
}

/// Drives the credential callback of one clone.
///
/// libgit2 calls back again after the server rejects a credential, so the key
/// is offered once and the second request fails. The first failure is kept so
/// the caller can report it instead of libgit2's generic message. The SSH
/// config is read once, on the first callback that needs it.
pub(crate) struct CredentialSession {
    resolver: CredentialResolver,
    config: Option<SshConfig>,
    offered: Option<PathBuf>,
    failure: Option<AuthError>,
}

impl CredentialSession {
    pub(crate) fn new(resolver: CredentialResolver) -> Self {
        Self {
            resolver,
            config: None,
            offered: None,
            failure: None,
        }
    }

    fn config(&mut self) -> Result<&SshConfig, AuthError> {
        if self.config.is_none() {
            self.config = Some(self.resolver.load_config()?);
        }
        Ok(self.config.get_or_insert_default())
    }

    fn key_pair(&mut self, url: &str, username_from_url: Option<&str>) -> Result<SshKeyPair, AuthError> {
        key_pair_for(self.config()?, url, username_from_url)
    }

    /// Username to announce when the transport asks for one before any key.
    fn username(&mut self, url: &str, username_from_url: Option<&str>) -> String {
        if let Some(user) = username_from_url {
            return user.to_string();
        }
        let Some(host) = host_of(url) else {
            return DEFAULT_USERNAME.to_string();
        };
        match self.config() {
            Ok(config) => config
                .param(host, "User")
                .unwrap_or(DEFAULT_USERNAME)
                .to_string(),
            Err(err) => {
                tracing::warn!("No SSH user for {}, using {}: {}", host, DEFAULT_USERNAME, err);
                DEFAULT_USERNAME.to_string()
            }
        }
    }

    pub(crate) fn credential(
        &mut self,
        url: &str,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(key) = self.offered.take() {
                return Err(self.fail(AuthError::Rejected(key)));
            }
            return match self.key_pair(url, username_from_url) {
                Ok(pair) => {
                    self.offered = Some(pair.private_key.clone());
                    pair.to_cred()
                }
                Err(err) => Err(self.fail(err)),
            };
        }

        if allowed.contains(CredentialType::USERNAME) {
            let username = self.username(url, username_from_url);
            return Cred::username(&username);
        }

        if allowed.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }

        Err(git2::Error::from_str(&format!(
            "no credential available for {} (allowed: {:?})",
            url, allowed
        )))
    }

    fn fail(&mut self, err: AuthError) -> git2::Error {
        let git_err = git2::Error::from_str(&err.to_string());
        tracing::warn!("SSH credential lookup failed: {}", err);
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        git_err
    }

    pub(crate) fn take_failure(&mut self) -> Option<AuthError> {
        self.failure.take()
    }
}

/// Host part of a URI: `ssh://git@github.com:22/org/repo.git` → `github.com`.
pub fn host_of(uri: &str) -> Option<&str> {
    let rest = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let authority = rest.split('/').next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = authority.split(':').next()?;
    if host.is_empty() { None } else { Some(host) }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(idx);
    let value = rest
        .trim_start()
        .strip_prefix('=')
        .unwrap_or(rest.trim_start())
        .trim();
    if value.is_empty() {
        None
    } else {
        Some((keyword, value))
    }
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
# personal settings
Host github.com
    User git
    IdentityFile /keys/github_ed25519

Host *.corp.example.com !build.corp.example.com
    IdentityFile=/keys/corp
    Port 2222

Host nokey.example.com
    User deploy

Host *
    IdentityFile /keys/fallback
"#;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("config");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn block(patterns: &[&str]) -> HostBlock {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        HostBlock::new(&patterns)
    }

    #[test]
    fn test_host_patterns() {
        assert!(block(&["*"]).matches("anything"));
        assert!(block(&["*.example.com"]).matches("git.example.com"));
        assert!(!block(&["*.example.com"]).matches("example.com"));
        assert!(block(&["host?"]).matches("host1"));
        assert!(!block(&["host?"]).matches("host12"));
        assert!(block(&["GitHub.com"]).matches("github.COM"));
        assert!(!block(&["*.example.com", "!ci.example.com"]).matches("ci.example.com"));
        assert!(!block(&[]).matches("github.com"));
    }

    #[test]
    fn test_uncompilable_pattern_is_ignored() {
        let config = SshConfig::parse("Host [broken github.com\n  IdentityFile /keys/gh\n");
        assert!(config.has_host("github.com"));
        assert!(!config.has_host("[broken"));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("ssh://git@github.com/acme/widget.git"), Some("github.com"));
        assert_eq!(host_of("ssh://github.com:22/acme/widget.git"), Some("github.com"));
        assert_eq!(host_of("https://example.org/acme/widget.git"), Some("example.org"));
        assert_eq!(host_of("ssh:///acme/widget.git"), None);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/keys/id"), PathBuf::from("/keys/id"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.ssh/id_ed25519"), home.join(".ssh/id_ed25519"));
        }
    }

    #[test]
    fn test_param_first_match_wins() {
        let config = SshConfig::parse(CONFIG);
        assert_eq!(config.param("github.com", "IdentityFile"), Some("/keys/github_ed25519"));
        assert_eq!(config.param("GitHub.com", "identityfile"), Some("/keys/github_ed25519"));
        assert_eq!(config.param("git.corp.example.com", "IdentityFile"), Some("/keys/corp"));
        assert_eq!(config.param("git.corp.example.com", "Port"), Some("2222"));
        assert_eq!(config.param("build.corp.example.com", "IdentityFile"), Some("/keys/fallback"));
        assert_eq!(config.param("nokey.example.com", "IdentityFile"), Some("/keys/fallback"));
    }

    #[test]
    fn test_has_host_ignores_leading_globals() {
        let config = SshConfig::parse("IdentityFile /keys/global\nHost a.example\n  User x\n");
        assert!(config.has_host("a.example"));
        assert!(!config.has_host("b.example"));
        assert_eq!(config.param("b.example", "IdentityFile"), Some("/keys/global"));
    }

    #[test]
    fn test_resolve_from_config_file() {
        let (_dir, path) = write_config(CONFIG);
        let resolver = CredentialResolver::new(Some(path));

        let pair = resolver
            .resolve("ssh://git@github.com/acme/widget.git", None)
            .expect("resolve github");
        assert_eq!(pair.username, "git");
        assert_eq!(pair.private_key, PathBuf::from("/keys/github_ed25519"));
        assert_eq!(pair.public_key, PathBuf::from("/keys/github_ed25519.pub"));

        let pair = resolver
            .resolve("ssh://git.corp.example.com/acme/widget.git", Some("alice"))
            .expect("resolve corp");
        assert_eq!(pair.username, "alice");
        assert_eq!(pair.private_key, PathBuf::from("/keys/corp"));
    }

    #[test]
    fn test_resolve_missing_config_is_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let resolver = CredentialResolver::new(Some(dir.path().join("missing")));
        let err = resolver
            .resolve("ssh://git@github.com/acme/widget.git", None)
            .expect_err("missing config must fail");
        assert!(matches!(err, AuthError::ConfigUnreadable { .. }));
    }

    #[test]
    fn test_resolve_unknown_host_is_error() {
        let (_dir, path) = write_config("Host github.com\n  IdentityFile /keys/gh\n");
        let resolver = CredentialResolver::new(Some(path));
        let err = resolver
            .resolve("ssh://git@gitlab.com/acme/widget.git", None)
            .expect_err("unknown host must fail");
        assert!(matches!(err, AuthError::HostNotFound(ref h) if h == "gitlab.com"));
    }

    #[test]
    fn test_resolve_block_without_identity_is_error() {
        let (_dir, path) = write_config("Host nokey.example.com\n  User deploy\n");
        let resolver = CredentialResolver::new(Some(path));
        let err = resolver
            .resolve("ssh://nokey.example.com/acme/widget.git", None)
            .expect_err("no identity must fail");
        assert!(matches!(err, AuthError::NoIdentityFile(_)));
    }

    #[test]
    fn test_session_offers_key_once() {
        let (_dir, path) = write_config(CONFIG);
        let mut session = CredentialSession::new(CredentialResolver::new(Some(path)));
        let url = "ssh://git@github.com/acme/widget.git";

        // The key files do not exist; only the second-offer rejection is under test.
        let _ = session.credential(url, Some("git"), CredentialType::SSH_KEY);
        let second = session.credential(url, Some("git"), CredentialType::SSH_KEY);
        assert!(second.is_err());
        assert!(matches!(session.take_failure(), Some(AuthError::Rejected(_))));
    }

    #[test]
    fn test_session_reads_config_once() {
        let (dir, path) = write_config(CONFIG);
        let mut session = CredentialSession::new(CredentialResolver::new(Some(path.clone())));
        let url = "ssh://nokey.example.com/acme/widget.git";

        assert_eq!(session.username(url, None), "deploy");
        fs::remove_file(&path).unwrap();
        assert_eq!(session.username(url, None), "deploy");
        assert!(session.credential(url, None, CredentialType::SSH_KEY).is_ok());
        assert!(session.take_failure().is_none());
        drop(dir);
    }

    #[test]
    fn test_session_username_without_config() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut session =
            CredentialSession::new(CredentialResolver::new(Some(dir.path().join("missing"))));
        let url = "ssh://github.com/acme/widget.git";
        assert_eq!(session.username(url, None), DEFAULT_USERNAME);
        assert_eq!(session.username(url, Some("alice")), "alice");
    }

    #[test]
    fn test_session_records_lookup_failure() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut session =
            CredentialSession::new(CredentialResolver::new(Some(dir.path().join("missing"))));
        let result = session.credential(
            "ssh://git@github.com/acme/widget.git",
            Some("git"),
            CredentialType::SSH_KEY,
        );
        assert!(result.is_err());
        assert!(matches!(
            session.take_failure(),
            Some(AuthError::ConfigUnreadable { .. })
        ));
        assert!(session.take_failure().is_none());
    }
}
