mod project;
mod records;

pub use project::{PROJECT_SHARD_PREFIX, Project, ProjectHistory, ProjectIds, StageTimings};
pub use records::{Branch, Commit, ContentRef, Snapshot};
