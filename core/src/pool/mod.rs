// chainwork/src/pool/mod.rs

//! Worker pools backing asynchronous chain execution.
//!
//! The executor only depends on the `WorkerPool` trait, so a host can hand it
//! a pool shared with other components or an adapter over its own runtime.
//! `BoundedWorkerPool` is the provided implementation.

pub mod bounded;
pub mod config;

pub use bounded::BoundedWorkerPool;
pub use config::{PoolConfig, SaturationPolicy};

use std::time::Duration;
use thiserror::Error;

/// A unit of work submitted to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a pool refused a job. The job is dropped in every case.
#[derive(Debug, Error)]
pub enum SubmitError {
  #[error("worker pool is saturated")]
  Saturated,
  #[error("worker pool is shut down")]
  ShutDown,
  #[error("failed to spawn worker thread: {0}")]
  Spawn(#[source] std::io::Error),
}

pub trait WorkerPool: Send + Sync {
  /// Hands `job` to the pool. Implementations may run it on the calling
  /// thread before returning.
  fn submit(&self, job: Job) -> Result<(), SubmitError>;

  /// Stops accepting new jobs. Jobs already accepted still run.
  fn shutdown(&self);

  fn is_shutdown(&self) -> bool;

  /// Blocks until every accepted job has finished after `shutdown`, or until
  /// `timeout` elapses. Returns `true` if the pool drained in time.
  fn await_termination(&self, timeout: Duration) -> bool;
}
