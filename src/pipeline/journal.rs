//! Run journal
//!
//! Per-repository record files plus the run-wide failure log and run stamp.
//! Every file is header-less CSV.

use csv::{ReaderBuilder, Writer, WriterBuilder};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{IoContext, MineError, Result};
use crate::model::{Branch, Commit, Project, Snapshot};
use crate::repository::MineSink;

fn open_csv(path: &Path, append: bool) -> Result<Writer<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .at(path)?;
    Ok(WriterBuilder::new().has_headers(false).from_writer(file))
}

/// One row of `runs_downloader.csv`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RunStamp {
    pub epoch_seconds: i64,
    pub next_project_id: u64,
    pub errors: u64,
    pub distinct_contents: u64,
    pub snapshots: u64,
    pub elapsed_seconds: u64,
}

/// Run-wide journal files.
pub struct RunJournal {
    failed_path: PathBuf,
    failed: Mutex<Writer<File>>,
    stamp_path: PathBuf,
}

impl RunJournal {
    /// Open the journal; the failure log starts empty every run.
    pub fn open(failed_path: &Path, stamp_path: &Path) -> Result<Self> {
        Ok(Self {
            failed_path: failed_path.to_path_buf(),
            failed: Mutex::new(open_csv(failed_path, false)?),
            stamp_path: stamp_path.to_path_buf(),
        })
    }

    pub fn record_failure(&self, url: &str, id: u64) -> Result<()> {
        let id = id.to_string();
        let mut failed = self.failed.lock();
        failed.write_record([url, id.as_str()])?;
        failed.flush().at(&self.failed_path)
    }

    /// Next project id recorded by the last completed run, if any.
    pub fn previous_next_id(&self) -> Result<Option<u64>> {
        if !self.stamp_path.is_file() {
            return Ok(None);
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.stamp_path)?;
        let mut last = None;
        for record in reader.records() {
            let record = record?;
            if let Some(field) = record.get(1) {
                last = Some(field.to_string());
            }
        }
        last.map(|field| {
            field.trim().parse().map_err(|_| {
                MineError::Consistency(format!(
                    "{}: invalid next project id {}",
                    self.stamp_path.display(),
                    field
                ))
            })
        })
        .transpose()
    }

    pub fn append_stamp(&self, stamp: &RunStamp) -> Result<()> {
        let mut writer = open_csv(&self.stamp_path, true)?;
        writer.serialize(stamp)?;
        writer.flush().at(&self.stamp_path)
    }
}

/// Record files of one repository, fed while it is mined.
pub struct ProjectOutput {
    branches: Writer<File>,
    commits: Writer<File>,
    snapshots: Writer<File>,
}

impl ProjectOutput {
    /// Open the record files, appending when `append` is set.
    pub fn open(project: &Project, append: bool) -> Result<Self> {
        Ok(Self {
            branches: open_csv(&project.file_branches(), append)?,
            commits: open_csv(&project.file_commits(), append)?,
            snapshots: open_csv(&project.file_snapshots(), append)?,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        for writer in [&mut self.branches, &mut self.commits, &mut self.snapshots] {
            writer.flush().map_err(|e| MineError::io("project records", e))?;
        }
        Ok(())
    }
}

impl MineSink for ProjectOutput {
    fn branch(&mut self, branch: &Branch) -> Result<()> {
        Ok(self.branches.serialize(branch)?)
    }

    fn commit(&mut self, commit: &Commit) -> Result<()> {
        Ok(self.commits.serialize(commit)?)
    }

    fn snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        Ok(self.snapshots.serialize(snapshot)?)
    }
}

/// Write the summary log that marks `project` as done.
pub fn write_project_log(project: &Project) -> Result<()> {
    let path = project.file_log();
    let mut writer = open_csv(&path, false)?;
    writer.write_record(project.summary_record())?;
    writer.flush().at(&path)
}

/// Remove outputs of an interrupted attempt so it can start over.
pub fn discard_partial_outputs(project: &Project) -> Result<()> {
    for path in [
        project.file_branches(),
        project.file_commits(),
        project.file_snapshots(),
        project.file_metadata(),
    ] {
        match fs::remove_file(&path) {
            Ok(()) => debug!("Discarded stale {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MineError::io(&path, e)),
        }
    }
    Ok(())
}
