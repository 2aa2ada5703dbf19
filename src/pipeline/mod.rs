//! Mining pipeline
//!
//! - **scheduler**: worker pool with pull-based status
//! - **worker**: per-project stage machine
//! - **run**: shared run state and finalization
//! - **journal**: per-project and run-wide output files
//! - **feed**: input file parsing
//! - **metadata**: hosting API responses

mod feed;
mod journal;
mod metadata;
mod run;
mod scheduler;
mod worker;

pub use feed::{FeedStats, feed_from};
pub use journal::{ProjectOutput, RunJournal, RunStamp};
pub use metadata::{TokenPool, fetch_metadata};
pub use run::{MiningRun, ProgressSample, RunContext, RunSummary};
pub use scheduler::{Scheduler, Worker};
pub use worker::{ProjectWorker, Stage};
