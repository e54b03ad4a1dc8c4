// chainwork/src/pool/bounded.rs

//! A thread pool with a bounded backlog and a configurable saturation policy.
//!
//! Submission follows the classic core/max scheme:
//! 1. below `core_workers` live workers, a new worker is spawned for the job;
//! 2. otherwise the job is queued if the backlog has room;
//! 3. otherwise a worker is spawned if below `max_workers`;
//! 4. otherwise the `SaturationPolicy` decides.
//!
//! Workers above `core_workers` exit after `keep_alive` of idleness. Core
//! workers live until shutdown.

use crate::error::{panic_message, ChainResult};
use crate::pool::config::{PoolConfig, SaturationPolicy};
use crate::pool::{Job, SubmitError, WorkerPool};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{event, Level};

struct PoolState {
  queue: VecDeque<Job>,
  workers: usize,
  shutdown: bool,
  next_worker_id: usize,
}

struct Shared {
  state: Mutex<PoolState>,
  /// Signalled when a job is queued or the pool shuts down.
  job_ready: Condvar,
  /// Signalled when a queued job is taken (used by `SaturationPolicy::Block`).
  space_ready: Condvar,
  /// Signalled when the last worker exits.
  terminated: Condvar,
  config: PoolConfig,
}

pub struct BoundedWorkerPool {
  shared: Arc<Shared>,
}

impl BoundedWorkerPool {
  /// Creates a pool. No threads are started until the first submission.
  pub fn new(config: PoolConfig) -> ChainResult<Self> {
    config.validate()?;
    Ok(Self::build(config))
  }

  fn build(config: PoolConfig) -> Self {
    event!(
      Level::DEBUG,
      core_workers = config.core_workers,
      max_workers = config.max_workers,
      queue_capacity = config.queue_capacity,
      saturation = ?config.saturation,
      "Creating worker pool."
    );
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(PoolState {
          queue: VecDeque::with_capacity(config.queue_capacity),
          workers: 0,
          shutdown: false,
          next_worker_id: 0,
        }),
        job_ready: Condvar::new(),
        space_ready: Condvar::new(),
        terminated: Condvar::new(),
        config,
      }),
    }
  }

  pub fn config(&self) -> &PoolConfig {
    &self.shared.config
  }

  /// Number of live worker threads.
  pub fn active_workers(&self) -> usize {
    self.shared.state.lock().workers
  }

  /// Number of jobs waiting in the backlog.
  pub fn queued_jobs(&self) -> usize {
    self.shared.state.lock().queue.len()
  }

  fn spawn_worker(&self, state: &mut PoolState, first_job: Option<Job>) -> Result<(), SubmitError> {
    let worker_id = state.next_worker_id;
    state.next_worker_id += 1;
    let shared = Arc::clone(&self.shared);
    let name = format!("{}-{}", self.shared.config.thread_name_prefix, worker_id);

    thread::Builder::new()
      .name(name)
      .spawn(move || worker_loop(shared, first_job))
      .map_err(|e| {
        event!(Level::ERROR, error = %e, "Failed to spawn worker thread.");
        SubmitError::Spawn(e)
      })?;
    // The new thread cannot retire before we release the lock.
    state.workers += 1;
    event!(Level::TRACE, worker_id, workers = state.workers, "Worker spawned.");
    Ok(())
  }

  /// Queues `job`, making sure at least one worker will pick it up.
  fn enqueue(&self, state: &mut PoolState, job: Job) -> Result<(), SubmitError> {
    state.queue.push_back(job);
    if state.workers == 0 {
      if let Err(e) = self.spawn_worker(state, None) {
        state.queue.pop_back();
        return Err(e);
      }
    } else {
      self.shared.job_ready.notify_one();
    }
    Ok(())
  }
}

impl WorkerPool for BoundedWorkerPool {
  fn submit(&self, job: Job) -> Result<(), SubmitError> {
    let config = &self.shared.config;
    let mut state = self.shared.state.lock();

    if state.shutdown {
      return Err(SubmitError::ShutDown);
    }
    if state.workers < config.core_workers {
      return self.spawn_worker(&mut state, Some(job));
    }
    if state.queue.len() < config.queue_capacity {
      return self.enqueue(&mut state, job);
    }
    if state.workers < config.max_workers {
      return self.spawn_worker(&mut state, Some(job));
    }

    match config.saturation {
      SaturationPolicy::Reject => {
        event!(Level::WARN, workers = state.workers, queued = state.queue.len(), "Pool saturated, rejecting job.");
        Err(SubmitError::Saturated)
      }
      SaturationPolicy::Block => {
        event!(Level::DEBUG, "Pool saturated, waiting for queue space.");
        while state.queue.len() >= config.queue_capacity && !state.shutdown {
          self.shared.space_ready.wait(&mut state);
        }
        if state.shutdown {
          return Err(SubmitError::ShutDown);
        }
        self.enqueue(&mut state, job)
      }
      SaturationPolicy::CallerRuns => {
        drop(state);
        event!(Level::WARN, "Pool saturated, running job on the submitting thread.");
        job();
        Ok(())
      }
    }
  }

  fn shutdown(&self) {
    let mut state = self.shared.state.lock();
    if !state.shutdown {
      state.shutdown = true;
      event!(
        Level::INFO,
        workers = state.workers,
        queued = state.queue.len(),
        "Worker pool shutting down."
      );
    }
    if state.workers == 0 {
      self.shared.terminated.notify_all();
    }
    drop(state);
    self.shared.job_ready.notify_all();
    self.shared.space_ready.notify_all();
  }

  fn is_shutdown(&self) -> bool {
    self.shared.state.lock().shutdown
  }

  fn await_termination(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut state = self.shared.state.lock();
    while state.workers > 0 {
      if self.shared.terminated.wait_until(&mut state, deadline).timed_out() {
        return state.workers == 0;
      }
    }
    true
  }
}

impl Default for BoundedWorkerPool {
  fn default() -> Self {
    Self::build(PoolConfig::default())
  }
}

impl Drop for BoundedWorkerPool {
  fn drop(&mut self) {
    // Idle workers would otherwise wait on `job_ready` forever.
    self.shutdown();
  }
}

impl std::fmt::Debug for BoundedWorkerPool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.shared.state.lock();
    f.debug_struct("BoundedWorkerPool")
      .field("config", &self.shared.config)
      .field("workers", &state.workers)
      .field("queued", &state.queue.len())
      .field("shutdown", &state.shutdown)
      .finish()
  }
}

fn worker_loop(shared: Arc<Shared>, first_job: Option<Job>) {
  let mut next = first_job;
  loop {
    if let Some(job) = next.take() {
      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        event!(Level::ERROR, panic = %panic_message(payload.as_ref()), "Job panicked; worker continues.");
      }
    }
    match shared.next_job() {
      Some(job) => next = Some(job),
      None => return,
    }
  }
}

impl Shared {
  /// Waits for the next queued job. `None` means the calling worker must exit.
  fn next_job(&self) -> Option<Job> {
    let mut state = self.state.lock();
    loop {
      if let Some(job) = state.queue.pop_front() {
        self.space_ready.notify_one();
        return Some(job);
      }
      if state.shutdown {
        self.retire(&mut state);
        return None;
      }
      if state.workers > self.config.core_workers {
        let timed_out = self.job_ready.wait_for(&mut state, self.config.keep_alive()).timed_out();
        if timed_out && state.queue.is_empty() && state.workers > self.config.core_workers {
          event!(Level::TRACE, "Idle worker above core size exiting.");
          self.retire(&mut state);
          return None;
        }
      } else {
        self.job_ready.wait(&mut state);
      }
    }
  }

  fn retire(&self, state: &mut PoolState) {
    state.workers -= 1;
    if state.workers == 0 {
      self.terminated.notify_all();
    }
  }
}
