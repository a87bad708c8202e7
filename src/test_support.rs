//! Scratch repositories for tests. Also compiled into `tests/extraction.rs`
//! through a `#[path]` module, so it only depends on `git2` and `tempfile`.

use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Oid, Repository, Signature, Time};
use tempfile::TempDir;

pub fn init_repo() -> (TempDir, Repository) {
    let td = TempDir::new().expect("tempdir");
    let repo = Repository::init(td.path()).expect("init repo");
    {
        let mut config = repo.config().expect("repo config");
        config.set_str("user.name", "Tester").unwrap();
        config.set_str("user.email", "tester@example.com").unwrap();
    }
    (td, repo)
}

pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Stages a single path without committing.
pub fn stage(repo: &Repository, rel: &str) {
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(rel)).unwrap();
    index.write().unwrap();
}

/// Stages everything in the working tree and commits it at `seconds` since the epoch.
pub fn commit_all(repo: &Repository, message: &str, seconds: i64) -> Oid {
    let mut index = repo.index().unwrap();
    index.add_all(["."], IndexAddOption::DEFAULT, None).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::new("Tester", "tester@example.com", &Time::new(seconds, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Linear history of `count` commits, one minute apart. Commit `i` adds
/// `file<i>.txt` and rewrites `README.md`. Returns ids oldest first.
pub fn linear_history(count: usize) -> (TempDir, Repository, Vec<Oid>) {
    let (td, repo) = init_repo();
    let mut oids = Vec::with_capacity(count);
    for i in 0..count {
        write(td.path(), &format!("file{}.txt", i), &format!("content {}\n", i));
        write(td.path(), "README.md", &format!("revision {}\n", i));
        oids.push(commit_all(&repo, &format!("commit number {}\n", i), 1_700_000_000 + i as i64 * 60));
    }
    (td, repo, oids)
}
