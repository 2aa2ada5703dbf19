//! Repository history
//!
//! - **history**: the read-only operations the miner needs from a repository
//! - **git_source**: libgit2 implementation of those operations
//! - **filter**: which paths are mined
//! - **miner**: branches and commits to snapshots

mod filter;
mod git_source;
mod history;
mod miner;

pub use filter::PathFilter;
pub use git_source::GitSource;
pub use history::{ChangeKind, ChangedObject, HistorySource};
pub use miner::{DiscardSink, HistoryMiner, MineSink};
