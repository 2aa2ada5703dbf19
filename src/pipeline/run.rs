//! One mining run: shared state, worker pool and finalization.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::feed::{FeedStats, feed_from};
use super::journal::{RunJournal, RunStamp};
use super::metadata::TokenPool;
use super::scheduler::Scheduler;
use super::worker::ProjectWorker;
use crate::config::Settings;
use crate::error::{IoContext, Result};
use crate::model::{Project, ProjectIds};
use crate::repository::{HistorySource, PathFilter};
use crate::store::{Compactor, ContentStore};
use crate::util::epoch_seconds;

/// State shared by every worker of a run.
pub struct RunContext {
    pub settings: Settings,
    pub store: ContentStore,
    pub journal: RunJournal,
    pub ids: ProjectIds,
    pub filter: PathFilter,
    pub tokens: TokenPool,
    pub source: Arc<dyn HistorySource>,
    /// Snapshots recorded by this run
    pub snapshots: AtomicU64,
}

impl RunContext {
    /// Open the target directory, replaying previous state on incremental runs.
    pub fn open(settings: Settings, source: Arc<dyn HistorySource>) -> Result<Self> {
        settings.validate()?;
        fs::create_dir_all(&settings.target).at(&settings.target)?;

        let compression = &settings.compression;
        let compactor = Compactor::new(
            compression.enabled,
            compression.background,
            compression.max_compressor_threads,
        );
        let store = ContentStore::open(
            &settings.files_dir(),
            &settings.content_hashes_file(),
            settings.files_per_folder,
            settings.incremental,
            compactor,
        )?;
        let journal = RunJournal::open(&settings.failed_projects_file(), &settings.run_stamp_file())?;
        let previous = if settings.incremental {
            journal.previous_next_id()?
        } else {
            None
        };
        let ids = match previous {
            Some(next) => {
                info!("Continuing project ids at {}", next);
                ProjectIds::starting_at(next)
            }
            None => ProjectIds::new(),
        };
        let tokens = TokenPool::load(&settings.api_tokens, &settings.api_tokens_file())?;
        if tokens.is_empty() {
            info!("No API tokens, metadata will not be fetched");
        }

        Ok(Self {
            filter: PathFilter::from_settings(&settings.filter),
            settings,
            store,
            journal,
            ids,
            tokens,
            source,
            snapshots: AtomicU64::new(0),
        })
    }
}

/// Totals reported once a run is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub completed: u64,
    pub errors: u64,
    pub distinct_contents: u64,
    pub snapshots: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Point-in-time view of a run, for progress reporting.
#[derive(Debug, Clone)]
pub struct ProgressSample {
    pub elapsed: Duration,
    pub completed: u64,
    pub errors: u64,
    pub queued: usize,
    pub statuses: Vec<String>,
    pub bytes: u64,
    pub distinct_contents: u64,
    pub snapshots: u64,
    pub compressors: usize,
}

pub struct MiningRun {
    ctx: Arc<RunContext>,
    scheduler: Scheduler<ProjectWorker>,
    started: Instant,
}

impl MiningRun {
    /// Open the run and start its worker threads; nothing is mined until
    /// [`run`](Self::run) or [`wait`](Self::wait).
    pub fn start(settings: Settings, source: Arc<dyn HistorySource>) -> Result<Self> {
        let ctx = Arc::new(RunContext::open(settings, source)?);
        let mut scheduler = Scheduler::new();
        scheduler.spawn(ctx.settings.threads, |_| ProjectWorker::new(Arc::clone(&ctx)))?;
        info!("Started {} workers", ctx.settings.threads);
        Ok(Self {
            ctx,
            scheduler,
            started: Instant::now(),
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Queue `url` under a new id.
    pub fn schedule_url(&self, url: &str) -> u64 {
        let id = self.ctx.ids.next_id();
        self.enqueue(url, id);
        id
    }

    /// Queue `url` under an explicit id; later ids are assigned above it.
    pub fn schedule(&self, url: &str, id: u64) {
        self.enqueue(url, self.ctx.ids.claim(id));
    }

    fn enqueue(&self, url: &str, id: u64) {
        let settings = &self.ctx.settings;
        let project = Project::new(url, id, &settings.projects_dir(), settings.files_per_folder);
        self.scheduler.schedule(project);
    }

    /// Queue every valid record of an input file.
    pub fn feed_from(&self, path: &Path) -> Result<FeedStats> {
        let settings = &self.ctx.settings;
        feed_from(
            path,
            &self.ctx.ids,
            settings.debug_skip,
            settings.debug_limit,
            |url, id| self.enqueue(&url, id),
        )
    }

    pub fn run(&self) {
        self.scheduler.run();
    }

    /// Block until every queued project is done.
    pub fn wait(&self) {
        self.scheduler.wait();
    }

    pub fn sample(&self) -> ProgressSample {
        ProgressSample {
            elapsed: self.started.elapsed(),
            completed: self.scheduler.completed_tasks(),
            errors: self.scheduler.error_tasks(),
            queued: self.scheduler.queued(),
            statuses: self.scheduler.statuses(),
            bytes: self.ctx.store.bytes(),
            distinct_contents: self.ctx.store.len() as u64,
            snapshots: self.ctx.snapshots.load(Ordering::Relaxed),
            compressors: self.ctx.store.active_compactions(),
        }
    }

    /// Wait for outstanding work, flush the store and append the run stamp.
    ///
    /// The stamp is written even when some projects failed or the mapping
    /// flush fails; a flush error is returned after the stamp is down.
    pub fn finalize(self) -> Result<RunSummary> {
        self.wait();
        let flushed = self.ctx.store.finalize();

        let summary = RunSummary {
            completed: self.scheduler.completed_tasks(),
            errors: self.scheduler.error_tasks(),
            distinct_contents: self.ctx.store.len() as u64,
            snapshots: self.ctx.snapshots.load(Ordering::Relaxed),
            bytes: self.ctx.store.bytes(),
            elapsed: self.started.elapsed(),
        };
        self.ctx.journal.append_stamp(&RunStamp {
            epoch_seconds: epoch_seconds(),
            next_project_id: self.ctx.ids.peek(),
            errors: summary.errors,
            distinct_contents: summary.distinct_contents,
            snapshots: summary.snapshots,
            elapsed_seconds: summary.elapsed.as_secs(),
        })?;
        debug!(
            "Run finished: {} projects ({} failed), {} distinct files, {} snapshots",
            summary.completed, summary.errors, summary.distinct_contents, summary.snapshots
        );
        flushed?;
        Ok(summary)
    }
}
