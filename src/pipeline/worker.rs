//! Per-repository pipeline
//!
//! Drives one project through init, resume, clone, metadata, mine, persist
//! and delete. Any failure records the project in the failure log, removes
//! its working copy and is handed back to the scheduler.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use super::journal::{ProjectOutput, discard_partial_outputs, write_project_log};
use super::metadata::fetch_metadata;
use super::run::RunContext;
use super::scheduler::{Worker, panic_message};
use crate::error::{IoContext, MineError, Result};
use crate::model::Project;
use crate::repository::HistoryMiner;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Idle,
    Init,
    Resume,
    Clone,
    Metadata,
    Mine,
    Persist,
    Delete,
    Error,
}

impl Stage {
    pub fn code(self) -> char {
        match self {
            Stage::Idle => ' ',
            Stage::Init => 'I',
            Stage::Resume => 'R',
            Stage::Clone => 'C',
            Stage::Metadata => 'M',
            Stage::Mine => 'S',
            Stage::Persist => 'W',
            Stage::Delete => 'D',
            Stage::Error => 'E',
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Stage::Init,
            2 => Stage::Resume,
            3 => Stage::Clone,
            4 => Stage::Metadata,
            5 => Stage::Mine,
            6 => Stage::Persist,
            7 => Stage::Delete,
            8 => Stage::Error,
            _ => Stage::Idle,
        }
    }
}

/// Seconds since `start`, restarting the clock.
fn lap(start: &mut Instant) -> f64 {
    let seconds = start.elapsed().as_secs_f64();
    *start = Instant::now();
    seconds
}

pub struct ProjectWorker {
    ctx: Arc<RunContext>,
    stage: AtomicU8,
    project: AtomicU64,
}

impl ProjectWorker {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self {
            ctx,
            stage: AtomicU8::new(Stage::Idle as u8),
            project: AtomicU64::new(0),
        }
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Relaxed))
    }

    fn enter(&self, stage: Stage) {
        debug!(
            "Project {}: {:?}",
            self.project.load(Ordering::Relaxed),
            stage
        );
        self.stage.store(stage as u8, Ordering::Relaxed);
    }

    fn process(&self, project: &mut Project) -> Result<()> {
        let settings = &self.ctx.settings;
        let mut clock = Instant::now();

        self.enter(Stage::Init);
        fs::create_dir_all(project.root()).at(project.root())?;

        if settings.incremental {
            self.enter(Stage::Resume);
            if project.file_log().is_file() {
                info!("Project {} ({}) already mined, skipping", project.id, project.url);
                return Ok(());
            }
            discard_partial_outputs(project)?;
        }
        project.timings.resume = lap(&mut clock);

        self.enter(Stage::Clone);
        let repo = project.repo_path();
        if repo.exists() {
            fs::remove_dir_all(&repo).at(&repo)?;
        }
        let url = project.git_url(&settings.remote.git_base);
        self.ctx
            .source
            .clone_repo(&url, &repo)
            .map_err(|e| MineError::CloneFailed {
                url: url.clone(),
                id: project.id,
                reason: e.to_string(),
            })?;
        project.timings.clone = lap(&mut clock);

        self.enter(Stage::Metadata);
        if !self.ctx.tokens.is_empty() {
            let api_url = project.api_url(&settings.remote.api_base);
            fetch_metadata(&self.ctx.tokens, &api_url, &project.file_metadata())?;
        }
        project.timings.metadata = lap(&mut clock);

        self.enter(Stage::Mine);
        let mut output = ProjectOutput::open(project, settings.incremental)?;
        HistoryMiner::new(
            self.ctx.source.as_ref(),
            &self.ctx.store,
            &self.ctx.filter,
            &self.ctx.snapshots,
        )
        .mine(project, &mut output)?;
        output.flush()?;
        project.timings.mine = lap(&mut clock);

        self.enter(Stage::Persist);
        // the mapping must be durable before the log marks the project done
        self.ctx.store.flush()?;
        write_project_log(project)?;

        if !settings.keep_repos {
            self.enter(Stage::Delete);
            fs::remove_dir_all(&repo).at(&repo)?;
        }
        project.timings.delete = lap(&mut clock);

        info!(
            "Project {} ({}): {} commits, {} snapshots, clone {:.1}s, mine {:.1}s, delete {:.1}s",
            project.id,
            project.url,
            project.history.commits.len(),
            project.history.snapshots.len(),
            project.timings.clone,
            project.timings.mine,
            project.timings.delete
        );
        Ok(())
    }

    fn fail(&self, project: &Project) {
        self.enter(Stage::Error);
        let url = project.git_url(&self.ctx.settings.remote.git_base);
        if let Err(e) = self.ctx.journal.record_failure(&url, project.id) {
            tracing::error!("Unable to record failure of project {}: {}", project.id, e);
        }
        let repo = project.repo_path();
        if repo.exists() {
            if let Err(e) = fs::remove_dir_all(&repo) {
                debug!("Cleanup of {} failed: {}", repo.display(), e);
            }
        }
    }
}

impl Worker for ProjectWorker {
    type Item = Project;

    fn run(&self, mut project: Project) -> Result<()> {
        self.project.store(project.id, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&mut project)))
            .unwrap_or_else(|payload| Err(MineError::Panicked(panic_message(payload.as_ref()))));
        if outcome.is_err() {
            self.fail(&project);
        }
        self.enter(Stage::Idle);
        outcome
    }

    fn status(&self) -> String {
        match self.stage() {
            Stage::Idle => "IDLE".to_string(),
            stage => format!("{}:{}", stage.code(), self.project.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_codes_round_trip() {
        for stage in [
            Stage::Idle,
            Stage::Init,
            Stage::Resume,
            Stage::Clone,
            Stage::Metadata,
            Stage::Mine,
            Stage::Persist,
            Stage::Delete,
            Stage::Error,
        ] {
            assert_eq!(Stage::from_u8(stage as u8), stage);
        }
        assert_eq!(Stage::Mine.code(), 'S');
        assert_eq!(Stage::Persist.code(), 'W');
    }
}
