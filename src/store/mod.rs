//! Content storage
//!
//! - **content**: hash -> id assignment and the global mapping file
//! - **shard**: id -> directory layout shared by content and project trees
//! - **compact**: archiving of full shards

mod compact;
mod content;
mod shard;

pub use compact::{ARCHIVE_NAME, Compactor, compact_shard};
pub use content::{ContentHash, ContentStore, SHARD_PREFIX};
pub use shard::{shard_index, shard_path, slots_filled};
