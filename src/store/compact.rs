//! Shard compaction
//!
//! A full shard's `*.raw` files are packed into one `files.tar.gz` and then
//! removed. Background compactions are gated by a shared slot counter.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{IoContext, MineError, Result};

pub const ARCHIVE_NAME: &str = "files.tar.gz";

/// Pack every `*.raw` file of `dir` into `dir/files.tar.gz` and delete them.
///
/// Returns the number of files archived.
pub fn compact_shard(dir: &Path) -> Result<usize> {
    let mut raw: Vec<PathBuf> = fs::read_dir(dir)
        .at(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "raw"))
        .collect();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.sort();

    let archive = dir.join(ARCHIVE_NAME);
    let partial = dir.join(format!("{}.partial", ARCHIVE_NAME));
    {
        let file = File::create(&partial).at(&partial)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for path in &raw {
            let name = path.file_name().unwrap_or_default();
            builder.append_path_with_name(path, name).at(path)?;
        }
        builder
            .into_inner()
            .and_then(|gz| gz.finish())
            .and_then(|f| f.sync_all())
            .at(&partial)?;
    }
    fs::rename(&partial, &archive).at(&archive)?;

    for path in &raw {
        fs::remove_file(path).at(path)?;
    }
    debug!("Compacted {} files in {}", raw.len(), dir.display());
    Ok(raw.len())
}

/// Runs shard compactions inline or on bounded background threads.
pub struct Compactor {
    enabled: bool,
    background: bool,
    max_active: usize,
    active: Arc<AtomicUsize>,
}

impl Compactor {
    pub fn new(enabled: bool, background: bool, max_active: usize) -> Self {
        Self {
            enabled,
            background,
            max_active,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, false, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of compactions currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Compact `dir`, on a background thread when a slot is free.
    ///
    /// Inline compaction errors are returned; background ones are logged.
    pub fn submit(&self, dir: PathBuf) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.background && self.try_reserve() {
            let active = Arc::clone(&self.active);
            let spawned = thread::Builder::new()
                .name("compactor".into())
                .spawn(move || {
                    if let Err(e) = compact_shard(&dir) {
                        warn!("Unable to compress files in {}: {}", dir.display(), e);
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            if let Err(e) = spawned {
                self.active.fetch_sub(1, Ordering::SeqCst);
                warn!("Unable to spawn compactor thread: {}", e);
                return Err(MineError::io("compactor", e));
            }
            return Ok(());
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = compact_shard(&dir);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result.map(|_| ())
    }

    /// Block until no compaction is running.
    pub fn drain(&self) {
        while self.active() > 0 {
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn try_reserve(&self) -> bool {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_active).then_some(n + 1)
            })
            .is_ok()
    }
}
