// chainwork/src/registry.rs

//! Defines `ChainRegistry<P, R>`, the concurrent store mapping pipeline names
//! to ordered handler sequences.

use crate::core::handler::SharedHandler;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{event, Level};

/// How the registry orders the handlers of one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
  /// Handlers run in the order they were registered. Order values passed to
  /// `register_with_order` are ignored.
  #[default]
  RegistrationOrder,
  /// Handlers run by ascending order value; equal values keep registration
  /// order. `register` uses `DEFAULT_ORDER`.
  ByOrder,
}

/// Order value used by `ChainRegistry::register`.
pub const DEFAULT_ORDER: i32 = 0;

struct Registration<P, R> {
  order: i32,
  handler: SharedHandler<P, R>,
}

impl<P, R> Clone for Registration<P, R> {
  fn clone(&self) -> Self {
    Self {
      order: self.order,
      handler: Arc::clone(&self.handler),
    }
  }
}

/// The pipeline registry.
///
/// Each pipeline's sequence is stored as an immutable `Arc<Vec<_>>`. A
/// registration builds a new vector and swaps it in while holding the entry's
/// shard lock, so readers see either the old or the new sequence, never a
/// partial one. Registrations under different names only contend when they
/// hash to the same shard.
pub struct ChainRegistry<P, R> {
  pipelines: DashMap<String, Arc<Vec<Registration<P, R>>>>,
  ordering: OrderingPolicy,
}

impl<P, R> ChainRegistry<P, R> {
  /// Creates an empty registry that keeps registration order.
  pub fn new() -> Self {
    Self::with_ordering(OrderingPolicy::RegistrationOrder)
  }

  pub fn with_ordering(ordering: OrderingPolicy) -> Self {
    Self {
      pipelines: DashMap::new(),
      ordering,
    }
  }

  pub fn ordering_policy(&self) -> OrderingPolicy {
    self.ordering
  }

  /// Appends `handler` to the pipeline `pipeline_name`, creating it if needed.
  pub fn register(&self, pipeline_name: impl Into<String>, handler: SharedHandler<P, R>) {
    self.register_with_order(pipeline_name, DEFAULT_ORDER, handler);
  }

  /// Registers `handler` with an explicit order value.
  ///
  /// Under `OrderingPolicy::RegistrationOrder` the value is recorded but does
  /// not affect placement.
  pub fn register_with_order(&self, pipeline_name: impl Into<String>, order: i32, handler: SharedHandler<P, R>) {
    let pipeline_name = pipeline_name.into();
    event!(
      Level::DEBUG,
      pipeline = %pipeline_name,
      handler = %handler.name(),
      order,
      "Registering handler."
    );

    let mut entry = self.pipelines.entry(pipeline_name).or_default();
    let mut next: Vec<Registration<P, R>> = Vec::with_capacity(entry.len() + 1);
    next.extend(entry.iter().cloned());

    let position = match self.ordering {
      OrderingPolicy::RegistrationOrder => next.len(),
      // First slot whose order is strictly greater keeps equal orders stable.
      OrderingPolicy::ByOrder => next.partition_point(|existing| existing.order <= order),
    };
    next.insert(position, Registration { order, handler });
    *entry = Arc::new(next);
  }

  /// Returns a snapshot of the handler sequence for `pipeline_name`.
  ///
  /// Unknown names yield an empty sequence. Later registrations do not affect
  /// a snapshot already returned.
  pub fn build(&self, pipeline_name: &str) -> Vec<SharedHandler<P, R>> {
    let snapshot = match self.pipelines.get(pipeline_name) {
      Some(entry) => Arc::clone(entry.value()),
      None => return Vec::new(),
    };
    snapshot.iter().map(|r| Arc::clone(&r.handler)).collect()
  }

  pub fn list_pipeline_names(&self) -> BTreeSet<String> {
    self.pipelines.iter().map(|entry| entry.key().clone()).collect()
  }

  pub fn contains(&self, pipeline_name: &str) -> bool {
    self.pipelines.contains_key(pipeline_name)
  }

  pub fn handler_count(&self, pipeline_name: &str) -> usize {
    self.pipelines.get(pipeline_name).map_or(0, |entry| entry.len())
  }

  /// Removes a whole pipeline, returning how many handlers it held.
  pub fn remove(&self, pipeline_name: &str) -> usize {
    let removed = self
      .pipelines
      .remove(pipeline_name)
      .map_or(0, |(_, handlers)| handlers.len());
    event!(Level::DEBUG, pipeline = %pipeline_name, removed, "Pipeline removed.");
    removed
  }

  /// Removes every pipeline. Intended for test teardown.
  pub fn clear(&self) {
    self.pipelines.clear();
    event!(Level::DEBUG, "Registry cleared.");
  }
}

impl<P, R> Default for ChainRegistry<P, R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<P, R> std::fmt::Debug for ChainRegistry<P, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChainRegistry")
      .field("ordering", &self.ordering)
      .field("pipelines", &self.list_pipeline_names())
      .finish()
  }
}
