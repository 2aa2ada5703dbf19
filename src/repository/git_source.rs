use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Delta, DiffOptions, FileMode, ObjectType, Oid, ReferenceType, Repository, Sort,
    TreeWalkMode, TreeWalkResult,
};
use std::path::Path;
use tracing::{debug, warn};

use super::history::{ChangeKind, ChangedObject, HistorySource};
use crate::error::{MineError, Result};
use crate::model::Commit;
use crate::store::ContentHash;

const LINK_MODE: i32 = 0o120000;

/// [`HistorySource`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitSource;

impl GitSource {
    pub fn new() -> Self {
        Self
    }
}

fn tool_error(context: &str, e: git2::Error) -> MineError {
    MineError::History(format!("{}: {}", context, e.message()))
}

fn open(repo: &Path) -> Result<Repository> {
    Repository::open(repo).map_err(|e| tool_error(&format!("open {}", repo.display()), e))
}

fn parse_oid(hash: &str) -> Result<Oid> {
    Oid::from_str(hash).map_err(|e| tool_error(&format!("bad commit id {}", hash), e))
}

fn force_checkout(repo: &Repository, oid: Oid) -> Result<()> {
    let commit = repo
        .find_commit(oid)
        .map_err(|e| tool_error(&format!("find commit {}", oid), e))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))
        .map_err(|e| tool_error(&format!("checkout {}", oid), e))?;
    repo.set_head_detached(oid)
        .map_err(|e| tool_error(&format!("detach HEAD at {}", oid), e))?;
    Ok(())
}

fn branch_tip(repo: &Repository, name: &str) -> Result<Oid> {
    let branch = repo
        .find_branch(name, BranchType::Remote)
        .map_err(|e| tool_error(&format!("find branch {}", name), e))?;
    let commit = branch
        .get()
        .peel_to_commit()
        .map_err(|e| tool_error(&format!("resolve branch {}", name), e))?;
    Ok(commit.id())
}

impl HistorySource for GitSource {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("Cloning {} into {}", url, dest.display());
        RepoBuilder::new()
            .clone(url, dest)
            .map_err(|e| tool_error(&format!("clone {}", url), e))?;
        Ok(())
    }

    fn branches(&self, repo: &Path) -> Result<Vec<String>> {
        let repo = open(repo)?;
        let mut names = Vec::new();
        let branches = repo
            .branches(Some(BranchType::Remote))
            .map_err(|e| tool_error("list branches", e))?;
        for entry in branches {
            let (branch, _) = entry.map_err(|e| tool_error("list branches", e))?;
            if branch.get().kind() == Some(ReferenceType::Symbolic) {
                continue;
            }
            match branch.name() {
                Ok(Some(name)) if !name.ends_with("/HEAD") => names.push(name.to_string()),
                Ok(Some(_)) => {}
                _ => warn!("Skipping branch with a non UTF-8 name"),
            }
        }
        Ok(names)
    }

    fn checkout_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let repo = open(repo)?;
        let tip = branch_tip(&repo, name)?;
        force_checkout(&repo, tip)
    }

    fn commits(&self, repo: &Path, branch: &str) -> Result<Vec<Commit>> {
        let repo = open(repo)?;
        let tip = branch_tip(&repo, branch)?;
        let mut revwalk = repo.revwalk().map_err(|e| tool_error("revwalk", e))?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(|e| tool_error("revwalk", e))?;
        revwalk.push(tip).map_err(|e| tool_error("revwalk", e))?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(|e| tool_error(&format!("log {}", branch), e))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|e| tool_error(&format!("find commit {}", oid), e))?;
            commits.push(Commit {
                hash: oid.to_string(),
                time: commit.time().seconds(),
            });
        }
        Ok(commits)
    }

    fn changed_objects(
        &self,
        repo: &Path,
        commit: &str,
        parent: Option<&str>,
    ) -> Result<Vec<ChangedObject>> {
        let repo = open(repo)?;
        let tree = repo
            .find_commit(parse_oid(commit)?)
            .and_then(|c| c.tree())
            .map_err(|e| tool_error(&format!("tree of {}", commit), e))?;

        let Some(parent) = parent else {
            return list_tree(&tree);
        };

        let parent_tree = repo
            .find_commit(parse_oid(parent)?)
            .and_then(|c| c.tree())
            .map_err(|e| tool_error(&format!("tree of {}", parent), e))?;
        let mut options = DiffOptions::new();
        options.ignore_submodules(true);
        let diff = repo
            .diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut options))
            .map_err(|e| tool_error(&format!("diff {}..{}", parent, commit), e))?;

        let mut objects = Vec::new();
        for delta in diff.deltas() {
            let (kind, file) = match delta.status() {
                Delta::Added => (ChangeKind::Added, delta.new_file()),
                Delta::Modified => (ChangeKind::Modified, delta.new_file()),
                Delta::Deleted => (ChangeKind::Deleted, delta.old_file()),
                _ => (ChangeKind::Unknown, delta.new_file()),
            };
            if file.mode() == FileMode::Commit {
                continue;
            }
            let Some(path) = file.path().and_then(|p| p.to_str()) else {
                warn!("Skipping non UTF-8 path in {}", commit);
                continue;
            };
            objects.push(ChangedObject {
                hash: ContentHash::from_slice(file.id().as_bytes())?,
                path: path.to_string(),
                kind,
                symlink: file.mode() == FileMode::Link,
            });
        }
        Ok(objects)
    }

    fn checkout_commit(&self, repo: &Path, commit: &str) -> Result<()> {
        let repo = open(repo)?;
        force_checkout(&repo, parse_oid(commit)?)
    }

    fn file_bytes(&self, repo: &Path, commit: &str, path: &str) -> Result<Vec<u8>> {
        let repo = open(repo)?;
        let tree = repo
            .find_commit(parse_oid(commit)?)
            .and_then(|c| c.tree())
            .map_err(|e| tool_error(&format!("tree of {}", commit), e))?;
        let blob = tree
            .get_path(Path::new(path))
            .and_then(|entry| entry.to_object(&repo))
            .and_then(|object| object.peel_to_blob())
            .map_err(|e| tool_error(&format!("{} at {}", path, commit), e))?;
        Ok(blob.content().to_vec())
    }
}

fn list_tree(tree: &git2::Tree<'_>) -> Result<Vec<ChangedObject>> {
    let mut objects = Vec::new();
    let mut failure = None;
    tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
        // gitlinks are commits, not blobs
        if entry.kind() != Some(ObjectType::Blob) {
            return TreeWalkResult::Ok;
        }
        let Some(name) = entry.name() else {
            warn!("Skipping non UTF-8 path under {}", dir);
            return TreeWalkResult::Ok;
        };
        match ContentHash::from_slice(entry.id().as_bytes()) {
            Ok(hash) => {
                objects.push(ChangedObject {
                    hash,
                    path: format!("{}{}", dir, name),
                    kind: ChangeKind::Added,
                    symlink: entry.filemode() == LINK_MODE,
                });
                TreeWalkResult::Ok
            }
            Err(e) => {
                failure = Some(e);
                TreeWalkResult::Abort
            }
        }
    })
    .or_else(|e| {
        // an aborted walk reports a user error; keep ours instead
        if failure.is_some() {
            Ok(())
        } else {
            Err(tool_error("walk tree", e))
        }
    })?;
    match failure {
        Some(e) => Err(e),
        None => Ok(objects),
    }
}
