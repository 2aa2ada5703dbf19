//! Sharded directory layout
//!
//! Ids are split into chunks of `fan_out`; the chunk number is written as a
//! base-`fan_out` number, one directory per digit, so no directory ever holds
//! more than `fan_out` files no matter how many ids are handed out.

use std::path::PathBuf;

/// Relative directory for `id`, e.g. `files_1/files_0` for `fan_out = 10, id = 100`.
///
/// Ids in the first chunk map to the empty path (the tree root).
pub fn shard_path(id: u64, fan_out: u64, prefix: &str) -> PathBuf {
    debug_assert!(fan_out >= 2);
    let mut digits = Vec::new();
    let mut dir_id = id / fan_out;
    while dir_id != 0 {
        digits.push(dir_id % fan_out);
        dir_id /= fan_out;
    }
    digits
        .iter()
        .rev()
        .map(|d| format!("{}{}", prefix, d))
        .collect()
}

/// Index of the chunk `id` belongs to.
pub fn shard_index(id: u64, fan_out: u64) -> u64 {
    id / fan_out
}

/// Number of slots of shard `index` filled once `assigned` ids exist.
pub fn slots_filled(index: u64, fan_out: u64, assigned: u64) -> u64 {
    let start = index * fan_out;
    assigned.saturating_sub(start).min(fan_out)
}
