//! Content-addressable store
//!
//! Hands out dense content ids in first-seen order, keyed by the git blob
//! hash of the bytes. New blobs are written to the sharded `files/` tree and
//! appended to the global `hash,id` mapping file, which is replayed on
//! incremental runs.

use csv::{ReaderBuilder, WriterBuilder};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::compact::Compactor;
use super::shard::{shard_index, shard_path, slots_filled};
use crate::error::{IoContext, MineError, Result};

/// Directory prefix of the content shards
pub const SHARD_PREFIX: &str = "files_";

/// Git blob object id of a byte sequence.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    /// Hash `bytes` the way git hashes a blob.
    pub fn of_bytes(bytes: &[u8]) -> Result<Self> {
        let oid = git2::Oid::hash_object(git2::ObjectType::Blob, bytes)?;
        Self::from_slice(oid.as_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let raw = hex::decode(hex_str)
            .map_err(|e| MineError::InvalidInput(format!("bad content hash {}: {}", hex_str, e)))?;
        Self::from_slice(&raw)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; 20] = raw.try_into().map_err(|_| {
            MineError::InvalidInput(format!("content hash must be 20 bytes, got {}", raw.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// State of a hash in the index.
#[derive(Debug, Copy, Clone)]
enum Entry {
    /// Blob and mapping line are on disk.
    Stored(u64),
    /// Claimed by a thread that is still writing the blob.
    Writing(u64),
}

/// What a lookup-or-insert found.
enum Claim {
    Known(u64),
    Assigned(u64),
}

#[derive(Default)]
struct ContentIndex {
    entries: FxHashMap<ContentHash, Entry>,
    next: u64,
    /// Ids given back by failed writes, reused lowest first
    free: BTreeSet<u64>,
    stored: u64,
}

impl ContentIndex {
    fn resumed(loaded: FxHashMap<ContentHash, u64>) -> Self {
        let count = loaded.len() as u64;
        Self {
            entries: loaded
                .into_iter()
                .map(|(hash, id)| (hash, Entry::Stored(id)))
                .collect(),
            next: count,
            free: BTreeSet::new(),
            stored: count,
        }
    }

    fn allocate(&mut self) -> u64 {
        if let Some(id) = self.free.pop_first() {
            return id;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    fn release(&mut self, id: u64) {
        if id + 1 != self.next {
            self.free.insert(id);
            return;
        }
        self.next = id;
        while self.next > 0 && self.free.remove(&(self.next - 1)) {
            self.next -= 1;
        }
    }
}

pub struct ContentStore {
    files_dir: PathBuf,
    mapping_path: PathBuf,
    fan_out: u64,
    /// hash -> id; lookup and insert happen under one lock
    index: Mutex<ContentIndex>,
    /// Signalled whenever a `Writing` entry is settled
    settled: Condvar,
    /// Kept apart from `index` so disk writes never hold up id assignment
    mapping: Mutex<csv::Writer<File>>,
    /// Raw files written per shard, keyed by shard index
    shard_fill: Mutex<FxHashMap<u64, u64>>,
    /// Ids that existed before this process started
    resumed: u64,
    compactor: Compactor,
    bytes: AtomicU64,
}

impl ContentStore {
    /// Open the store, replaying `mapping_path` first when `incremental` is set.
    ///
    /// A fresh store truncates the mapping file.
    pub fn open(
        files_dir: &Path,
        mapping_path: &Path,
        fan_out: u64,
        incremental: bool,
        compactor: Compactor,
    ) -> Result<Self> {
        fs::create_dir_all(files_dir).at(files_dir)?;
        if let Some(parent) = mapping_path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }

        let index = if incremental && mapping_path.is_file() {
            ContentIndex::resumed(load_mapping(mapping_path)?)
        } else {
            ContentIndex::default()
        };
        let resumed = index.stored;
        if resumed > 0 {
            info!("Loaded {} content hashes from previous runs", resumed);
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(incremental)
            .truncate(!incremental)
            .open(mapping_path)
            .at(mapping_path)?;
        let writer = WriterBuilder::new().has_headers(false).from_writer(file);

        Ok(Self {
            files_dir: files_dir.to_path_buf(),
            mapping_path: mapping_path.to_path_buf(),
            fan_out,
            index: Mutex::new(index),
            settled: Condvar::new(),
            mapping: Mutex::new(writer),
            shard_fill: Mutex::new(FxHashMap::default()),
            resumed,
            compactor,
            bytes: AtomicU64::new(0),
        })
    }

    /// Content id for `bytes`, storing them if they were never seen.
    pub fn assign_bytes(&self, bytes: &[u8]) -> Result<u64> {
        let hash = ContentHash::of_bytes(bytes)?;
        match self.claim(hash) {
            Claim::Known(id) => Ok(id),
            Claim::Assigned(id) => self.store_new(hash, id, bytes),
        }
    }

    /// Content id for the file `rel_path` under `root`, whose hash is already known.
    ///
    /// The file is only read when `hash` is new, and a file that cannot be read
    /// never consumes an id.
    pub fn assign_path(&self, hash: ContentHash, rel_path: &str, root: &Path) -> Result<u64> {
        if let Some(id) = self.lookup(&hash) {
            return Ok(id);
        }
        let path = root.join(rel_path);
        let bytes = fs::read(&path).at(&path)?;
        match self.claim(hash) {
            Claim::Known(id) => Ok(id),
            Claim::Assigned(id) => self.store_new(hash, id, &bytes),
        }
    }

    /// Id of a hash whose blob is on disk.
    pub fn lookup(&self, hash: &ContentHash) -> Option<u64> {
        match self.index.lock().entries.get(hash) {
            Some(Entry::Stored(id)) => Some(*id),
            _ => None,
        }
    }

    /// Number of distinct contents stored.
    pub fn len(&self) -> usize {
        self.index.lock().stored as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of new content written by this process.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn active_compactions(&self) -> usize {
        self.compactor.active()
    }

    /// Path of the raw file for `id` (before its shard is compacted).
    pub fn raw_path(&self, id: u64) -> PathBuf {
        self.shard_dir(id).join(format!("{}.raw", id))
    }

    /// Flush the mapping file so every id handed out so far is durable.
    pub fn flush(&self) -> Result<()> {
        self.mapping.lock().flush().at(&self.mapping_path)
    }

    /// Flush and wait for background compactions to finish.
    pub fn finalize(&self) -> Result<()> {
        let holes = self.index.lock().free.len();
        if holes > 0 {
            warn!(
                "{} content ids were released after failed writes and never reused",
                holes
            );
        }
        let flushed = self.flush();
        self.compactor.drain();
        flushed
    }

    /// Look `hash` up, inserting it as `Writing` on a miss.
    ///
    /// A hash another thread is still writing blocks until that write settles.
    fn claim(&self, hash: ContentHash) -> Claim {
        let mut index = self.index.lock();
        loop {
            match index.entries.get(&hash).copied() {
                Some(Entry::Stored(id)) => return Claim::Known(id),
                Some(Entry::Writing(_)) => self.settled.wait(&mut index),
                None => {
                    let id = index.allocate();
                    index.entries.insert(hash, Entry::Writing(id));
                    return Claim::Assigned(id);
                }
            }
        }
    }

    /// Publish or withdraw a `Writing` entry.
    fn settle(&self, hash: ContentHash, id: u64, stored: bool) {
        let mut index = self.index.lock();
        if stored {
            index.entries.insert(hash, Entry::Stored(id));
            index.stored += 1;
        } else {
            index.entries.remove(&hash);
            index.release(id);
        }
        drop(index);
        self.settled.notify_all();
    }

    fn store_new(&self, hash: ContentHash, id: u64, bytes: &[u8]) -> Result<u64> {
        if let Err(err) = self.persist(hash, id, bytes) {
            self.settle(hash, id, false);
            return Err(err);
        }
        self.settle(hash, id, true);

        if self.compactor.is_enabled() && self.record_written(id) {
            let dir = self.shard_dir(id);
            debug!("Shard {} is full, compacting", dir.display());
            self.compactor.submit(dir)?;
        }
        Ok(id)
    }

    fn persist(&self, hash: ContentHash, id: u64, bytes: &[u8]) -> Result<()> {
        let dir = self.shard_dir(id);
        fs::create_dir_all(&dir).at(&dir)?;
        let file = dir.join(format!("{}.raw", id));
        fs::write(&file, bytes).at(&file)?;

        self.mapping
            .lock()
            .write_record([hash.to_hex(), id.to_string()])?;
        self.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Count a written raw file; true once its shard holds all `fan_out` files.
    fn record_written(&self, id: u64) -> bool {
        let index = shard_index(id, self.fan_out);
        let mut fill = self.shard_fill.lock();
        let written = fill
            .entry(index)
            .or_insert_with(|| slots_filled(index, self.fan_out, self.resumed));
        *written += 1;
        if *written >= self.fan_out {
            fill.remove(&index);
            true
        } else {
            false
        }
    }

    fn shard_dir(&self, id: u64) -> PathBuf {
        self.files_dir.join(shard_path(id, self.fan_out, SHARD_PREFIX))
    }
}

fn load_mapping(path: &Path) -> Result<FxHashMap<ContentHash, u64>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut index = FxHashMap::default();
    let mut max_id: Option<u64> = None;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != 2 {
            return Err(MineError::Consistency(format!(
                "{}, line {}: expected hash,id",
                path.display(),
                line + 1
            )));
        }
        let hash = ContentHash::from_hex(&record[0])?;
        let id: u64 = record[1].parse().map_err(|_| {
            MineError::Consistency(format!(
                "{}, line {}: invalid content id {}",
                path.display(),
                line + 1,
                &record[1]
            ))
        })?;
        if index.insert(hash, id).is_some() {
            return Err(MineError::Consistency(format!(
                "{}: hash {} mapped twice",
                path.display(),
                hash
            )));
        }
        max_id = max_id.max(Some(id));
    }
    if let Some(max_id) = max_id {
        if max_id + 1 != index.len() as u64 {
            return Err(MineError::Consistency(format!(
                "{}: {} hashes but highest id is {}",
                path.display(),
                index.len(),
                max_id
            )));
        }
    }
    Ok(index)
}
