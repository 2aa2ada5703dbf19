//! Read-only view of a repository's history, as consumed by the miner.

use std::path::Path;

use crate::error::Result;
use crate::model::Commit;
use crate::store::ContentHash;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    /// Reported by the history but not one of the above (type changes, copies)
    Unknown,
}

/// A file object touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedObject {
    /// Blob id of the new content, or of the removed content for deletions
    pub hash: ContentHash,
    pub path: String,
    pub kind: ChangeKind,
    pub symlink: bool,
}

/// Operations against a single working copy.
///
/// Every method fails with a history error carrying the underlying tool's
/// diagnostic text.
pub trait HistorySource: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet.
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Remote-tracking branch names, symbolic refs excluded.
    fn branches(&self, repo: &Path) -> Result<Vec<String>>;

    fn checkout_branch(&self, repo: &Path, name: &str) -> Result<()>;

    /// Commits reachable from `branch`, newest first with parents after children.
    fn commits(&self, repo: &Path, branch: &str) -> Result<Vec<Commit>>;

    /// Objects changed by `commit` relative to `parent`; every file of the
    /// commit's tree, reported as added, when there is no parent.
    fn changed_objects(
        &self,
        repo: &Path,
        commit: &str,
        parent: Option<&str>,
    ) -> Result<Vec<ChangedObject>>;

    /// Force the working tree to the contents of `commit`.
    fn checkout_commit(&self, repo: &Path, commit: &str) -> Result<()>;

    fn file_bytes(&self, repo: &Path, commit: &str, path: &str) -> Result<Vec<u8>>;
}
