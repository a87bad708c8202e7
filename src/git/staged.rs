use std::path::Path;

use git2::{Repository, Status};

use crate::error::Result;
use crate::models::{MetadataAttributes, Object, Origin};

/// Object type bits of an index entry mode.
const MODE_TYPE_MASK: u32 = 0o170000;
/// Submodule pointer: the id names a commit in another repository.
const MODE_GITLINK: u32 = 0o160000;

/// Status bits describing a difference between HEAD and the index.
fn staged_bits() -> Status {
    Status::INDEX_NEW | Status::INDEX_MODIFIED | Status::INDEX_RENAMED | Status::INDEX_TYPECHANGE
}

/// One object per index entry whose staged content differs from HEAD, in
/// index (path) order. The content is the staged blob, not the working tree file.
pub fn objects_from_staged_files(repo: &Repository) -> Result<Vec<Object>> {
    let index = repo.index()?;
    let mut objects = Vec::new();

    for entry in index.iter() {
        let path = String::from_utf8_lossy(&entry.path).into_owned();
        if entry.mode & MODE_TYPE_MASK == MODE_GITLINK {
            tracing::debug!("Skipping submodule entry {}", path);
            continue;
        }
        let status = repo.status_file(Path::new(&path))?;

        if !status.intersects(staged_bits()) {
            continue;
        }

        let blob = repo.find_blob(entry.id)?;
        tracing::debug!("Staged {} ({:?})", path, status);

        let mut o = Object::new(path, Origin::FileContent, blob.content().to_vec());
        o.set_metadata("status", "staged", MetadataAttributes::default());
        objects.push(o);
    }

    tracing::info!("Found {} staged files", objects.len());

    Ok(objects)
}
