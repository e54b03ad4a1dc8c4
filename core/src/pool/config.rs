// chainwork/src/pool/config.rs

//! Configuration for `BoundedWorkerPool`.
//!
//! `PoolConfig` derives serde so host applications can load it from whatever
//! configuration source they already use; every field has a default.

use crate::error::{ChainError, ChainResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `submit` does when the queue is full and no more workers may be spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
  /// Refuse the job. Async executions resolve with `ChainError::Rejected`.
  Reject,
  /// Block the submitting thread until the queue has room.
  Block,
  /// Run the job on the submitting thread. Nothing is dropped and the queue
  /// stays bounded, at the cost of latency for that caller.
  #[default]
  CallerRuns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  /// Workers kept alive while idle.
  pub core_workers: usize,
  /// Upper bound on live workers.
  pub max_workers: usize,
  /// Idle seconds after which a worker above `core_workers` exits.
  pub keep_alive_secs: u64,
  /// Capacity of the backlog queue.
  pub queue_capacity: usize,
  pub saturation: SaturationPolicy,
  /// Worker threads are named `<prefix>-<n>`.
  pub thread_name_prefix: String,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      core_workers: 5,
      max_workers: 10,
      keep_alive_secs: 60,
      queue_capacity: 100,
      saturation: SaturationPolicy::CallerRuns,
      thread_name_prefix: "chain-worker".to_string(),
    }
  }
}

impl PoolConfig {
  /// A pool of exactly `workers` threads.
  pub fn fixed(workers: usize) -> Self {
    Self {
      core_workers: workers,
      max_workers: workers,
      ..Self::default()
    }
  }

  pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
    self.queue_capacity = queue_capacity;
    self
  }

  pub fn with_saturation(mut self, saturation: SaturationPolicy) -> Self {
    self.saturation = saturation;
    self
  }

  pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
    self.keep_alive_secs = keep_alive.as_secs();
    self
  }

  pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.thread_name_prefix = prefix.into();
    self
  }

  pub fn keep_alive(&self) -> Duration {
    Duration::from_secs(self.keep_alive_secs)
  }

  pub fn validate(&self) -> ChainResult<()> {
    if self.max_workers == 0 {
      return Err(ChainError::InvalidConfig("max_workers must be at least 1".to_string()));
    }
    if self.core_workers > self.max_workers {
      return Err(ChainError::InvalidConfig(format!(
        "core_workers ({}) exceeds max_workers ({})",
        self.core_workers, self.max_workers
      )));
    }
    if self.queue_capacity == 0 {
      return Err(ChainError::InvalidConfig("queue_capacity must be at least 1".to_string()));
    }
    Ok(())
  }
}
