pub mod credentials;
pub mod history;
pub mod locator;
pub mod repository;
pub mod staged;

pub use history::{Extraction, HistoryScope, SkippedEntry};
pub use locator::{Location, LocationKind, normalize};
pub use repository::{CancelToken, CloneSettings, RepoHandle};
