//! Fixed-size worker pool
//!
//! Items are queued with [`Scheduler::schedule`] and handed to idle workers
//! once [`Scheduler::run`] has been called. Each worker runs one item to
//! completion before taking the next; a failing or panicking item only bumps
//! the error counter.
//!
//! Progress is pull-based: [`Scheduler::statuses`] and the counters can be
//! sampled from any thread without blocking the workers.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, warn};

use crate::error::{MineError, Result};

/// One thread's worth of work.
pub trait Worker: Send + Sync + 'static {
    type Item: Send + 'static;

    fn run(&self, item: Self::Item) -> Result<()>;

    /// Human-readable current activity.
    fn status(&self) -> String;
}

struct QueueState<T> {
    queue: VecDeque<T>,
    running: bool,
    in_flight: usize,
    shutdown: bool,
    started: Option<Instant>,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    work_ready: Condvar,
    idle: Condvar,
    completed: AtomicU64,
    errors: AtomicU64,
}

pub struct Scheduler<W: Worker> {
    shared: Arc<Shared<W::Item>>,
    workers: Vec<Arc<W>>,
    handles: Vec<JoinHandle<()>>,
}

impl<W: Worker> Default for Scheduler<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Worker> Scheduler<W> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    running: false,
                    in_flight: 0,
                    shutdown: false,
                    started: None,
                }),
                work_ready: Condvar::new(),
                idle: Condvar::new(),
                completed: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
            workers: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Start `n` worker threads, building each worker with `factory(index)`.
    pub fn spawn(&mut self, n: usize, mut factory: impl FnMut(usize) -> W) -> Result<()> {
        for _ in 0..n {
            let index = self.workers.len();
            let worker = Arc::new(factory(index));
            let shared = Arc::clone(&self.shared);
            let thread_worker = Arc::clone(&worker);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || worker_loop(&shared, &*thread_worker))
                .map_err(|e| MineError::io("worker thread", e))?;
            self.workers.push(worker);
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Queue an item; safe to call while workers are running.
    pub fn schedule(&self, item: W::Item) {
        let mut state = self.shared.state.lock();
        state.queue.push_back(item);
        if state.running {
            self.shared.work_ready.notify_one();
        }
    }

    /// Let workers start taking items.
    pub fn run(&self) {
        let mut state = self.shared.state.lock();
        if !state.running {
            state.running = true;
            state.started = Some(Instant::now());
            self.shared.work_ready.notify_all();
        }
    }

    /// Block until the queue is empty and no item is in flight.
    ///
    /// Starts dispatch first if [`run`](Self::run) was never called.
    pub fn wait(&self) {
        self.run();
        let mut state = self.shared.state.lock();
        if self.workers.is_empty() && !state.queue.is_empty() {
            warn!("{} items queued but no workers were spawned", state.queue.len());
            return;
        }
        while !state.queue.is_empty() || state.in_flight > 0 {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Items finished so far, failed or not.
    pub fn completed_tasks(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// The failed subset of [`completed_tasks`](Self::completed_tasks).
    pub fn error_tasks(&self) -> u64 {
        self.shared.errors.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.status()).collect()
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Time since dispatch started.
    pub fn total_time(&self) -> Duration {
        self.shared
            .state
            .lock()
            .started
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

impl<W: Worker> Drop for Scheduler<W> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work_ready.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop<W: Worker>(shared: &Shared<W::Item>, worker: &W) {
    loop {
        let item = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if state.running {
                    if let Some(item) = state.queue.pop_front() {
                        state.in_flight += 1;
                        break item;
                    }
                }
                shared.work_ready.wait(&mut state);
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| worker.run(item))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Task failed: {}", e);
                shared.errors.fetch_add(1, Ordering::SeqCst);
            }
            Err(payload) => {
                error!("Task panicked: {}", panic_message(payload.as_ref()));
                shared.errors.fetch_add(1, Ordering::SeqCst);
            }
        }
        shared.completed.fetch_add(1, Ordering::SeqCst);

        let mut state = shared.state.lock();
        state.in_flight -= 1;
        if state.queue.is_empty() && state.in_flight == 0 {
            shared.idle.notify_all();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
