//! Records produced by mining one repository.
//!
//! All of them are written as header-less CSV rows; "deleted" content and a
//! missing parent are both written as `-1`.

use serde::{Serialize, Serializer};

/// A branch as first seen: its name and its oldest commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Branch {
    pub name: String,
    pub first_commit: String,
}

/// Commit identity is the hash alone.
#[derive(Debug, Clone, Serialize)]
pub struct Commit {
    pub hash: String,
    pub time: i64,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Commit {}

impl std::hash::Hash for Commit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// What a snapshot observed at its path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Stored(u64),
    Deleted,
}

impl ContentRef {
    pub fn id(self) -> Option<u64> {
        match self {
            ContentRef::Stored(id) => Some(id),
            ContentRef::Deleted => None,
        }
    }

    pub fn is_deleted(self) -> bool {
        self == ContentRef::Deleted
    }
}

impl Serialize for ContentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentRef::Stored(id) => serializer.serialize_u64(*id),
            ContentRef::Deleted => serializer.serialize_i64(-1),
        }
    }
}

/// One observation of a path at a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Sequential per repository, starting at 0
    pub local_id: u64,
    pub content: ContentRef,
    /// Local id of the previous snapshot of the same path on this branch
    #[serde(serialize_with = "serialize_parent")]
    pub parent: Option<u64>,
    pub commit: String,
    pub path: String,
}

fn serialize_parent<S: Serializer>(parent: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
    match parent {
        Some(id) => serializer.serialize_u64(*id),
        None => serializer.serialize_i64(-1),
    }
}
