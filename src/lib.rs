//! git-source - extracts file blobs and commit messages from a git repository
//! for secret scanning.
//!
//! # Usage
//! ```no_run
//! use git_source::{GitSource, LoadOptions, Source};
//!
//! let mut options = LoadOptions::new();
//! options.insert("commit-messages".into(), true.into());
//! options.insert("commit-count".into(), 10.into());
//!
//! let objects = GitSource::new().load_objects("git@github.com:acme/widget.git", &options)?;
//! for object in &objects {
//!     println!("{} {}", object.origin, object.id);
//! }
//! # Ok::<(), git_source::SourceError>(())
//! ```

pub mod error;
pub mod git;
pub mod models;
pub mod source;

#[cfg(test)]
mod test_support;

pub use error::{AuthError, Result, SourceError};
pub use git::{CancelToken, Extraction, SkippedEntry};
pub use models::{GitLoadOptions, LoadOptions, Metadata, MetadataAttributes, Object, Origin};
pub use source::{GitSource, SOURCE_TYPE, Source, SourceRegistry, register};
