//! A repository being mined and the state kept while mining it.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::records::{Branch, Snapshot};
use crate::store::shard_path;

pub const PROJECT_SHARD_PREFIX: &str = "projects_";

/// Source of repository ids, shared by everything that creates projects.
///
/// Explicit ids (replayed from an input file) push the counter past them so
/// auto-assigned ids never collide with replayed ones.
#[derive(Debug, Default)]
pub struct ProjectIds {
    next: AtomicU64,
}

impl ProjectIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start handing out ids at `next`.
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Record an explicitly supplied id.
    pub fn claim(&self, id: u64) -> u64 {
        self.next.fetch_max(id.saturating_add(1), Ordering::SeqCst);
        id
    }

    /// The id the next auto-assigned project would get.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

/// Wall-clock seconds spent in each pipeline stage.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StageTimings {
    pub resume: f64,
    pub clone: f64,
    pub metadata: f64,
    pub mine: f64,
    pub delete: f64,
}

/// Branches, commits and snapshots recorded for one repository.
#[derive(Debug, Default)]
pub struct ProjectHistory {
    pub branches: FxHashSet<Branch>,
    pub commits: FxHashSet<String>,
    pub snapshots: Vec<Snapshot>,
    /// path -> local id of its latest live snapshot on the current branch;
    /// `None` after a deletion
    pub last_ids: FxHashMap<String, Option<u64>>,
}

#[derive(Debug)]
pub struct Project {
    pub id: u64,
    /// `owner/name`, a full URL, or a local path
    pub url: String,
    pub has_denied_files: bool,
    pub timings: StageTimings,
    pub history: ProjectHistory,
    root: PathBuf,
}

impl Project {
    pub fn new(url: impl Into<String>, id: u64, projects_dir: &Path, fan_out: u64) -> Self {
        let root = projects_dir
            .join(shard_path(id, fan_out, PROJECT_SHARD_PREFIX))
            .join(id.to_string());
        Self {
            id,
            url: url.into(),
            has_denied_files: false,
            timings: StageTimings::default(),
            history: ProjectHistory::default(),
            root,
        }
    }

    /// Clone URL; `owner/name` descriptors resolve against `git_base`.
    pub fn git_url(&self, git_base: &str) -> String {
        if is_verbatim(&self.url) {
            self.url.clone()
        } else {
            format!("{}/{}.git", git_base.trim_end_matches('/'), self.url)
        }
    }

    pub fn api_url(&self, api_base: &str) -> String {
        format!("{}/{}", api_base.trim_end_matches('/'), self.url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working copy of the repository
    pub fn repo_path(&self) -> PathBuf {
        self.root.join("repo")
    }

    pub fn file_log(&self) -> PathBuf {
        self.root.join("log.csv")
    }

    pub fn file_branches(&self) -> PathBuf {
        self.root.join("branches.csv")
    }

    pub fn file_commits(&self) -> PathBuf {
        self.root.join("commits.csv")
    }

    pub fn file_snapshots(&self) -> PathBuf {
        self.root.join("snapshots.csv")
    }

    pub fn file_metadata(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    /// Summary row: id, url, denied flag, then the stage timings.
    pub fn summary_record(&self) -> [String; 8] {
        let t = &self.timings;
        [
            self.id.to_string(),
            self.url.clone(),
            if self.has_denied_files { "1" } else { "0" }.to_string(),
            format!("{:.3}", t.resume),
            format!("{:.3}", t.clone),
            format!("{:.3}", t.metadata),
            format!("{:.3}", t.mine),
            format!("{:.3}", t.delete),
        ]
    }
}

fn is_verbatim(url: &str) -> bool {
    url.contains("://")
        || url.starts_with('/')
        || url.starts_with('.')
        || url.starts_with("file:")
        || url.starts_with("git@")
}
