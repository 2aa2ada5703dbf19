//! History miner
//!
//! Walks every branch of a checked-out repository oldest commit first and
//! turns the objects each commit touches into parent-linked snapshots.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use super::filter::PathFilter;
use super::history::{ChangeKind, ChangedObject, HistorySource};
use crate::error::{MineError, Result};
use crate::model::{Branch, Commit, ContentRef, Project, Snapshot};
use crate::store::ContentStore;

/// Receives records as they are discovered.
pub trait MineSink {
    fn branch(&mut self, branch: &Branch) -> Result<()>;
    fn commit(&mut self, commit: &Commit) -> Result<()>;
    fn snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// Sink that drops everything; the project history still collects it all.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl MineSink for DiscardSink {
    fn branch(&mut self, _branch: &Branch) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self, _commit: &Commit) -> Result<()> {
        Ok(())
    }

    fn snapshot(&mut self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}

pub struct HistoryMiner<'a> {
    source: &'a dyn HistorySource,
    store: &'a ContentStore,
    filter: &'a PathFilter,
    /// Run-wide snapshot count, for reporting
    snapshots: &'a AtomicU64,
}

impl<'a> HistoryMiner<'a> {
    pub fn new(
        source: &'a dyn HistorySource,
        store: &'a ContentStore,
        filter: &'a PathFilter,
        snapshots: &'a AtomicU64,
    ) -> Self {
        Self {
            source,
            store,
            filter,
            snapshots,
        }
    }

    /// Mine every branch of `project`'s working copy.
    pub fn mine<S: MineSink>(&self, project: &mut Project, sink: &mut S) -> Result<()> {
        let repo = project.repo_path();
        let mut branches = self.source.branches(&repo)?;
        branches.sort();

        for name in &branches {
            self.mine_branch(project, &repo, name, sink)?;
        }
        debug!(
            "Project {}: {} branches, {} commits, {} snapshots",
            project.id,
            project.history.branches.len(),
            project.history.commits.len(),
            project.history.snapshots.len()
        );
        Ok(())
    }

    fn mine_branch<S: MineSink>(
        &self,
        project: &mut Project,
        repo: &Path,
        name: &str,
        sink: &mut S,
    ) -> Result<()> {
        project.history.last_ids.clear();
        self.source.checkout_branch(repo, name)?;

        let mut commits = self.source.commits(repo, name)?;
        commits.reverse();
        let Some(oldest) = commits.first() else {
            debug!("Branch {} has no commits", name);
            return Ok(());
        };

        let branch = Branch {
            name: name.to_string(),
            first_commit: oldest.hash.clone(),
        };
        if !project.history.branches.contains(&branch) {
            sink.branch(&branch)?;
            project.history.branches.insert(branch);
        }

        let mut previous: Option<&str> = None;
        for commit in &commits {
            if project.history.commits.insert(commit.hash.clone()) {
                sink.commit(commit)?;
                self.mine_commit(project, repo, commit, previous, sink)?;
            } else {
                trace!("Commit {} already mined", commit.hash);
            }
            previous = Some(commit.hash.as_str());
        }
        Ok(())
    }

    fn mine_commit<S: MineSink>(
        &self,
        project: &mut Project,
        repo: &Path,
        commit: &Commit,
        parent: Option<&str>,
        sink: &mut S,
    ) -> Result<()> {
        let objects = self.source.changed_objects(repo, &commit.hash, parent)?;
        let mut checked_out = false;

        for object in objects {
            if !self.filter.check(&object.path, &mut project.has_denied_files) {
                continue;
            }
            if !checked_out {
                self.source.checkout_commit(repo, &commit.hash)?;
                checked_out = true;
            }

            let local_id = project.history.snapshots.len() as u64;
            let parent_id = project
                .history
                .last_ids
                .get(&object.path)
                .copied()
                .flatten();

            let content = if object.kind == ChangeKind::Deleted {
                // a directory may now sit where the file was
                let leftover = repo
                    .join(&object.path)
                    .symlink_metadata()
                    .is_ok_and(|meta| !meta.is_dir());
                if leftover {
                    return Err(MineError::Consistency(format!(
                        "{} was deleted in {} but is still in the working tree",
                        object.path, commit.hash
                    )));
                }
                project.history.last_ids.insert(object.path.clone(), None);
                ContentRef::Deleted
            } else {
                let id = self.content_id(repo, &commit.hash, &object)?;
                project
                    .history
                    .last_ids
                    .insert(object.path.clone(), Some(local_id));
                ContentRef::Stored(id)
            };

            let snapshot = Snapshot {
                local_id,
                content,
                parent: parent_id,
                commit: commit.hash.clone(),
                path: object.path,
            };
            sink.snapshot(&snapshot)?;
            project.history.snapshots.push(snapshot);
            self.snapshots.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn content_id(&self, repo: &Path, commit: &str, object: &ChangedObject) -> Result<u64> {
        if object.symlink {
            // the link target, not whatever it points at
            let bytes = self.source.file_bytes(repo, commit, &object.path)?;
            self.store.assign_bytes(&bytes)
        } else {
            self.store.assign_path(object.hash, &object.path, repo)
        }
    }
}
