use git2::{Commit, ObjectType, Repository, Sort, Tree};

use crate::error::{Result, SourceError};
use crate::models::{MetadataAttributes, Object, Origin, TreeErrorPolicy};

/// An entry left out of a lenient history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub commit: String,
    /// `None` when the commit's tree itself could not be read
    pub path: Option<String>,
    pub message: String,
}

/// Objects of one load plus whatever the tree walk had to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub objects: Vec<Object>,
    pub skipped: Vec<SkippedEntry>,
}

impl Extraction {
    pub fn extend(&mut self, other: Extraction) {
        self.objects.extend(other.objects);
        self.skipped.extend(other.skipped);
    }
}

/// What to take from each visited commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryScope {
    pub commit_files: bool,
    pub commit_messages: bool,
    /// Most recent commits to visit; 0 walks everything reachable from HEAD.
    pub commit_count: usize,
    pub tree_errors: TreeErrorPolicy,
}

/// Walks history from HEAD, newest first, emitting commit messages and/or
/// every blob of every visited commit.
///
/// A bounded walk uses the range `HEAD~n..HEAD`. When that range cannot be
/// resolved (the history is shorter than `n`) the whole history is walked.
pub fn objects_from_commits(repo: &Repository, scope: &HistoryScope) -> Result<Extraction> {
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TIME)?;

    if scope.commit_count > 0 {
        let range = format!("HEAD~{}..HEAD", scope.commit_count);
        if let Err(err) = revwalk.push_range(&range) {
            tracing::debug!("Range {} unavailable ({}), walking full history", range, err.message());
            revwalk.push_head()?;
        }
    } else {
        revwalk.push_head()?;
    }

    let mut extraction = Extraction::default();
    let mut visited = 0usize;

    for oid in revwalk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let hash = oid.to_string();

        if scope.commit_messages {
            let mut o = Object::new(
                format!("commit-{}", hash),
                Origin::CommitMessage,
                commit.message_bytes().to_vec(),
            );
            o.set_metadata("commit", hash.as_str(), MetadataAttributes::default());
            extraction.objects.push(o);
        }

        if scope.commit_files {
            collect_commit_files(repo, &commit, &hash, scope.tree_errors, &mut extraction)?;
        }

        visited += 1;
        if visited % 100 == 0 {
            tracing::debug!("Processed {} commits", visited);
        }
    }

    tracing::info!(
        "Walked {} commits: {} objects, {} skipped",
        visited,
        extraction.objects.len(),
        extraction.skipped.len()
    );

    Ok(extraction)
}

fn collect_commit_files(
    repo: &Repository,
    commit: &Commit,
    hash: &str,
    policy: TreeErrorPolicy,
    out: &mut Extraction,
) -> Result<()> {
    match commit.tree() {
        Ok(tree) => walk_tree(repo, &tree, "", hash, policy, out),
        Err(err) => tolerate(policy, hash, None, err, out),
    }
}

/// Pre-order walk over `tree`. Names are raw bytes, so a non-UTF-8 path is
/// emitted lossily rather than cutting the walk short.
fn walk_tree(
    repo: &Repository,
    tree: &Tree,
    base_path: &str,
    hash: &str,
    policy: TreeErrorPolicy,
    out: &mut Extraction,
) -> Result<()> {
    for entry in tree.iter() {
        let path = format!("{}{}", base_path, String::from_utf8_lossy(entry.name_bytes()));

        match entry.kind() {
            Some(ObjectType::Blob) => match repo.find_blob(entry.id()) {
                Ok(blob) => {
                    let mut o = Object::new(path, Origin::FileContent, blob.content().to_vec());
                    o.set_metadata("commit", hash, MetadataAttributes::default());
                    o.set_metadata("uniq-id", entry.id().to_string(), MetadataAttributes::primary_key());
                    out.objects.push(o);
                }
                Err(err) => tolerate(policy, hash, Some(path), err, out)?,
            },
            Some(ObjectType::Tree) => match repo.find_tree(entry.id()) {
                Ok(subtree) => walk_tree(repo, &subtree, &format!("{}/", path), hash, policy, out)?,
                Err(err) => tolerate(policy, hash, Some(path), err, out)?,
            },
            // gitlinks point into another repository
            _ => {}
        }
    }
    Ok(())
}

fn tolerate(
    policy: TreeErrorPolicy,
    hash: &str,
    path: Option<String>,
    err: git2::Error,
    out: &mut Extraction,
) -> Result<()> {
    match policy {
        TreeErrorPolicy::Fail => {
            tracing::debug!("Aborting walk of {} at {}", hash, path.as_deref().unwrap_or("tree"));
            Err(SourceError::TreeWalk {
                commit: hash.to_string(),
                source: err,
            })
        }
        TreeErrorPolicy::Skip => {
            record_skip(hash, path, &err, out);
            Ok(())
        }
    }
}

fn record_skip(hash: &str, path: Option<String>, err: &git2::Error, out: &mut Extraction) {
    tracing::warn!(
        "Skipping {} in commit {}: {}",
        path.as_deref().unwrap_or("tree"),
        hash,
        err.message()
    );
    out.skipped.push(SkippedEntry {
        commit: hash.to_string(),
        path,
        message: err.message().to_string(),
    });
}
