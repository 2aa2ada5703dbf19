//! Progress reporting
//!
//! A reporter thread samples the run at a fixed interval and renders the
//! sample on an indicatif spinner. Workers never wait on it.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::pipeline::{MiningRun, ProgressSample};
use crate::util::{format_hms, format_size};

/// A handle to an active progress display
pub trait ProgressHandle: Send + Sync {
    fn update(&self, message: String);
    fn finish(&self);
}

/// Factory for creating progress handles
pub trait ProgressReporter: Send + Sync {
    fn start(&self, label: &str) -> Box<dyn ProgressHandle>;
}

/// Indicatif spinner; `quiet` draws nothing.
pub struct IndicatifProgress {
    quiet: bool,
}

impl IndicatifProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressReporter for IndicatifProgress {
    fn start(&self, label: &str) -> Box<dyn ProgressHandle> {
        if self.quiet {
            return Box::new(IndicatifHandle(ProgressBar::hidden()));
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template(&format!("{{spinner:.green}} {}: {{msg}}", label))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Box::new(IndicatifHandle(pb))
    }
}

struct IndicatifHandle(ProgressBar);

impl ProgressHandle for IndicatifHandle {
    fn update(&self, message: String) {
        self.0.set_message(message);
        self.0.tick();
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

/// One-line rendering of a sample.
pub fn describe(sample: &ProgressSample) -> String {
    format!(
        "{} | done {} err {} queued {} | files {} ({}) snapshots {} | zip {} | {}",
        format_hms(sample.elapsed),
        sample.completed,
        sample.errors,
        sample.queued,
        sample.distinct_contents,
        format_size(sample.bytes),
        sample.snapshots,
        sample.compressors,
        sample.statuses.join(" ")
    )
}

/// Run `work` while a reporter thread renders `run` every `interval`.
pub fn report_while<R>(
    run: &MiningRun,
    reporter: &dyn ProgressReporter,
    interval: Duration,
    work: impl FnOnce() -> R,
) -> R {
    let handle = reporter.start("mining");
    let (stop, stopped) = mpsc::channel::<()>();
    let result = thread::scope(|scope| {
        let handle = &handle;
        scope.spawn(move || {
            loop {
                handle.update(describe(&run.sample()));
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
        });
        let result = work();
        let _ = stop.send(());
        result
    });
    handle.finish();
    result
}
