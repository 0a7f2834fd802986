// Off-tick search execution.
//
// `SearchWorker` runs one search job at a time. In background mode each job
// gets its own named thread; in inline mode (tests, deterministic replays)
// the job runs to completion inside `submit`. Either way the result lands in
// a single-slot mailbox that the tick thread polls without blocking.
//
// Submitting a new job cancels the previous one through its `CancelToken`.
// Job ids increase monotonically and a delivery only replaces a mailbox
// entry from an older job, so a slow canceled search can never overwrite a
// newer result. `take_delivery` additionally drops anything that is not the
// currently active job.
//
// While a job runs it publishes `FrontierSnapshot`s into a shared slot for
// debug views.
//
// See also: `pathfinding.rs` for `CancelToken` and the search itself,
// `navigator.rs` which owns the worker.

use crate::pathfinding::{CancelToken, FrontierSnapshot, SearchReport};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A search packaged to run anywhere. Receives the job's cancel token and a
/// frontier publisher.
pub type SearchTask =
    Box<dyn FnOnce(&CancelToken, &mut dyn FnMut(FrontierSnapshot)) -> SearchReport + Send>;

/// Starts a named search thread.
pub type Spawner = fn(String, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>;

fn spawn_named(name: String, job: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name).spawn(job)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerMode {
    Background,
    Inline,
}

/// Why a job was submitted, echoed back with its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPurpose {
    /// Replaces whatever is executing.
    Fresh,
    /// Extends the executing provisional path from its end.
    Continuation,
}

#[derive(Debug)]
pub struct Delivery {
    pub job: u64,
    pub purpose: JobPurpose,
    pub report: SearchReport,
}

type Slot<T> = Arc<Mutex<Option<T>>>;

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn deliver(mailbox: &Mutex<Option<Delivery>>, delivery: Delivery) {
    let mut slot = lock(mailbox);
    if slot.as_ref().is_none_or(|held| held.job < delivery.job) {
        *slot = Some(delivery);
    }
}

struct ActiveJob {
    id: u64,
    purpose: JobPurpose,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

pub struct SearchWorker {
    mode: WorkerMode,
    spawn: Spawner,
    mailbox: Slot<Delivery>,
    frontier: Slot<FrontierSnapshot>,
    active: Option<ActiveJob>,
    /// Canceled or finished jobs whose threads may still be running.
    retired: Vec<JoinHandle<()>>,
    next_job: u64,
}

impl SearchWorker {
    pub fn new(mode: WorkerMode) -> Self {
        Self::with_spawner(mode, spawn_named)
    }

    /// Background threads come from `spawn` instead of `std::thread`.
    pub fn with_spawner(mode: WorkerMode, spawn: Spawner) -> Self {
        Self {
            mode,
            spawn,
            mailbox: Arc::new(Mutex::new(None)),
            frontier: Arc::new(Mutex::new(None)),
            active: None,
            retired: Vec::new(),
            next_job: 1,
        }
    }

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    /// Start `task`, canceling any running job. Returns the new job id, or
    /// the spawn error when no thread could be started; the task is lost
    /// and no job is active afterwards.
    pub fn submit(&mut self, purpose: JobPurpose, task: SearchTask) -> io::Result<u64> {
        self.cancel();
        self.retired.retain(|handle| !handle.is_finished());

        let id = self.next_job;
        self.next_job += 1;
        let cancel = CancelToken::new();
        *lock(&self.frontier) = None;

        let handle = match self.mode {
            WorkerMode::Inline => {
                run_job(id, purpose, task, &cancel, &self.mailbox, &self.frontier);
                None
            }
            WorkerMode::Background => {
                let mailbox = Arc::clone(&self.mailbox);
                let frontier = Arc::clone(&self.frontier);
                let token = cancel.clone();
                let job = Box::new(move || run_job(id, purpose, task, &token, &mailbox, &frontier));
                match (self.spawn)(format!("waymark-search-{id}"), job) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        log::error!("worker: failed to spawn search thread: {e}");
                        return Err(e);
                    }
                }
            }
        };
        self.active = Some(ActiveJob {
            id,
            purpose,
            cancel,
            handle,
        });
        log::trace!("worker: submitted job {id} ({purpose:?})");
        Ok(id)
    }

    /// Signal the active job to stop. Its result, if any, is discarded.
    pub fn cancel(&mut self) {
        if let Some(job) = self.active.take() {
            job.cancel.cancel();
            if let Some(handle) = job.handle {
                self.retired.push(handle);
            }
        }
    }

    pub fn is_searching(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_purpose(&self) -> Option<JobPurpose> {
        self.active.as_ref().map(|job| job.purpose)
    }

    /// Take the active job's result if it has arrived. Never blocks.
    pub fn take_delivery(&mut self) -> Option<Delivery> {
        let delivery = lock(&self.mailbox).take()?;
        let current = self
            .active
            .as_ref()
            .is_some_and(|job| job.id == delivery.job);
        if !current {
            log::trace!("worker: dropping stale result of job {}", delivery.job);
            return None;
        }
        if let Some(handle) = self.active.take().and_then(|job| job.handle) {
            self.retired.push(handle);
        }
        Some(delivery)
    }

    /// Block until the active job delivers or `timeout` elapses. Test and
    /// tooling hook; the tick path only uses `take_delivery`.
    pub fn wait_for_delivery(&mut self, timeout: Duration) -> Option<Delivery> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.take_delivery() {
                return Some(delivery);
            }
            if !self.is_searching() || Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Latest frontier published by the active job.
    pub fn frontier(&self) -> Option<FrontierSnapshot> {
        lock(&self.frontier).clone()
    }

    /// Cancel everything and join outstanding threads.
    pub fn shutdown(&mut self) {
        self.cancel();
        for handle in self.retired.drain(..) {
            if handle.join().is_err() {
                log::error!("worker: search thread panicked");
            }
        }
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(
    id: u64,
    purpose: JobPurpose,
    task: SearchTask,
    cancel: &CancelToken,
    mailbox: &Mutex<Option<Delivery>>,
    frontier: &Mutex<Option<FrontierSnapshot>>,
) {
    let mut publish = |snapshot: FrontierSnapshot| {
        *lock(frontier) = Some(snapshot);
    };
    let report = task(cancel, &mut publish);
    deliver(
        mailbox,
        Delivery {
            job: id,
            purpose,
            report,
        },
    );
}
