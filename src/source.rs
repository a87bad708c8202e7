//! Source plumbing: the `Source` trait hosts call, a registry to look
//! sources up by kind, and the git implementation that ties the pipeline
//! together.
//!
//! ```text
//! load_objects(source, options)
//!   → Location::parse            (local path or canonical remote URI)
//!   → repository::resolve        (open in place, or clone to a temp dir)
//!   → history::objects_from_commits   if commit-files or commit-messages
//!   → staged::objects_from_staged_files  if staged-files
//!   → history objects, then staged objects
//! ```

use crate::error::Result;
use crate::git::history::{self, Extraction, HistoryScope};
use crate::git::locator::Location;
use crate::git::repository::{self, CancelToken, CloneSettings};
use crate::git::staged;
use crate::models::{GitLoadOptions, LoadOptions, Object};

/// Kind under which the git source registers itself.
pub const SOURCE_TYPE: &str = "seekret-source-git";

/// Something that turns a source locator into content objects.
pub trait Source: Send + Sync {
    /// Registry key, e.g. `"seekret-source-git"`.
    fn kind(&self) -> &str;

    fn load_objects(&self, source: &str, options: &LoadOptions) -> Result<Vec<Object>>;
}

/// Sources available to a host, keyed by kind. Built explicitly at startup.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. A later registration of the same kind replaces the earlier one.
    pub fn register(&mut self, source: Box<dyn Source>) {
        self.sources.retain(|s| s.kind() != source.kind());
        self.sources.push(source);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|s| s.kind() == kind)
            .map(|s| s.as_ref())
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.kind()).collect()
    }
}

/// Adds the git source to `registry`.
pub fn register(registry: &mut SourceRegistry) {
    registry.register(Box::new(GitSource::new()));
}

#[derive(Debug, Clone, Default)]
pub struct GitSource {
    cancel: CancelToken,
}

impl GitSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones started by this source abort once `cancel` is triggered.
    pub fn with_cancel_token(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Runs the whole pipeline and keeps the entries a lenient walk skipped.
    pub fn extract(&self, source: &str, opt: &GitLoadOptions) -> Result<Extraction> {
        let location = Location::parse(source);
        let settings = CloneSettings::from_options(opt, self.cancel.clone());
        let handle = repository::resolve(&location, &settings)?;

        let mut extraction = Extraction::default();

        if opt.wants_history() {
            let scope = HistoryScope {
                commit_files: opt.commit_files,
                commit_messages: opt.commit_messages,
                commit_count: opt.commit_count,
                tree_errors: opt.tree_errors,
            };
            extraction.extend(history::objects_from_commits(handle.repo(), &scope)?);
        }

        if opt.staged_files {
            extraction
                .objects
                .extend(staged::objects_from_staged_files(handle.repo())?);
        }

        tracing::info!(
            "Extracted {} objects from {}",
            extraction.objects.len(),
            handle.location().value
        );

        Ok(extraction)
    }
}

impl Source for GitSource {
    fn kind(&self) -> &str {
        SOURCE_TYPE
    }

    fn load_objects(&self, source: &str, options: &LoadOptions) -> Result<Vec<Object>> {
        let opt = GitLoadOptions::from_options(options);
        Ok(self.extract(source, &opt)?.objects)
    }
}
