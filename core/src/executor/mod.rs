// chainwork/src/executor/mod.rs

//! Defines `ChainExecutor<P, R>`, which resolves a pipeline from a
//! `ChainRegistry` and runs it either on the calling thread or on a worker pool.

mod driver;
pub mod handle;

pub use handle::{Completion, ExecutionHandle};

use crate::core::context::HandlerContext;
use crate::core::control::ChainOutcome;
use crate::error::{ChainError, ChainResult};
use crate::pool::{BoundedWorkerPool, Job, PoolConfig, SubmitError, WorkerPool};
use crate::registry::ChainRegistry;
use driver::run_chain;
use futures::channel::oneshot;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, instrument, Level};

/// Runs registered pipelines.
///
/// Synchronous calls (`run`, `execute`) execute entirely on the caller's
/// thread. Asynchronous calls (`execute_async`, `execute_async_with_context`)
/// submit one job per invocation to the worker pool; the whole chain then runs
/// on a single worker. There is no timeout or cancellation: a caller that
/// wants a deadline wraps the returned handle in its own timeout and stops
/// waiting, the worker is not interrupted.
///
/// With the default `SaturationPolicy::CallerRuns`, an async call made while
/// the pool is saturated runs the chain on the calling thread before
/// returning. Latency-sensitive callers should size the pool or pick another
/// policy.
pub struct ChainExecutor<P, R> {
  registry: Arc<ChainRegistry<P, R>>,
  pool: Arc<dyn WorkerPool>,
}

impl<P, R> ChainExecutor<P, R> {
  /// Creates an executor with its own `BoundedWorkerPool` built from
  /// `PoolConfig::default()`.
  pub fn new(registry: Arc<ChainRegistry<P, R>>) -> Self {
    Self {
      registry,
      pool: Arc::new(BoundedWorkerPool::default()),
    }
  }

  /// Creates an executor with its own pool built from `config`.
  pub fn with_config(registry: Arc<ChainRegistry<P, R>>, config: PoolConfig) -> ChainResult<Self> {
    let pool = BoundedWorkerPool::new(config)?;
    Ok(Self {
      registry,
      pool: Arc::new(pool),
    })
  }

  /// Creates an executor on an externally owned pool, possibly shared with
  /// other executors. `shutdown` on any of them shuts the shared pool down.
  pub fn with_pool(registry: Arc<ChainRegistry<P, R>>, pool: Arc<dyn WorkerPool>) -> Self {
    Self { registry, pool }
  }

  pub fn registry(&self) -> &Arc<ChainRegistry<P, R>> {
    &self.registry
  }

  pub fn pool(&self) -> &Arc<dyn WorkerPool> {
    &self.pool
  }

  /// Runs `pipeline` against `ctx` on the calling thread and reports how it ended.
  pub fn run(&self, pipeline: &str, ctx: &mut HandlerContext<P, R>) -> ChainResult<ChainOutcome> {
    let handlers = self.registry.build(pipeline);
    run_chain(pipeline, &handlers, ctx)
  }

  /// Runs `pipeline` against `ctx` on the calling thread and returns a copy of
  /// the final response.
  ///
  /// The response also stays in `ctx`. On failure, whatever the handlers wrote
  /// before failing remains visible in `ctx`.
  pub fn execute(&self, pipeline: &str, ctx: &mut HandlerContext<P, R>) -> ChainResult<Option<R>>
  where
    R: Clone,
  {
    self.run(pipeline, ctx)?;
    Ok(ctx.response().cloned())
  }

  /// Stops accepting asynchronous work. Queued and running chains finish.
  pub fn shutdown(&self) {
    self.pool.shutdown();
  }

  pub fn is_shutdown(&self) -> bool {
    self.pool.is_shutdown()
  }

  /// Waits for the pool to drain after `shutdown`.
  pub fn await_termination(&self, timeout: Duration) -> bool {
    self.pool.await_termination(timeout)
  }
}

impl<P, R> ChainExecutor<P, R>
where
  P: Send + 'static,
  R: Send + 'static,
{
  /// Runs `pipeline` against `ctx` on the worker pool.
  ///
  /// The handle resolves to the final response, or to the failure that ended
  /// the chain. Submission problems (saturation under `Reject`, shutdown) are
  /// also reported through the handle, never returned from this call.
  #[instrument(name = "ChainExecutor::execute_async", skip_all, fields(pipeline = tracing::field::Empty))]
  pub fn execute_async(&self, pipeline: impl Into<String>, ctx: HandlerContext<P, R>) -> ExecutionHandle<Option<R>> {
    let pipeline = pipeline.into();
    tracing::Span::current().record("pipeline", pipeline.as_str());
    let registry = Arc::clone(&self.registry);

    self.submit(pipeline, move |pipeline| {
      let mut ctx = ctx;
      let handlers = registry.build(pipeline);
      run_chain(pipeline, &handlers, &mut ctx)?;
      Ok(ctx.take_response())
    })
  }

  /// Like `execute_async`, but hands back the whole context so attributes
  /// written by the handlers can be inspected, even after a failure.
  #[instrument(name = "ChainExecutor::execute_async_with_context", skip_all, fields(pipeline = tracing::field::Empty))]
  pub fn execute_async_with_context(
    &self,
    pipeline: impl Into<String>,
    ctx: HandlerContext<P, R>,
  ) -> ExecutionHandle<Completion<P, R>> {
    let pipeline = pipeline.into();
    tracing::Span::current().record("pipeline", pipeline.as_str());
    let registry = Arc::clone(&self.registry);

    self.submit(pipeline, move |pipeline| {
      let mut context = ctx;
      let handlers = registry.build(pipeline);
      let result = run_chain(pipeline, &handlers, &mut context);
      Ok(Completion { context, result })
    })
  }

  fn submit<T>(
    &self,
    pipeline: String,
    work: impl FnOnce(&str) -> ChainResult<T> + Send + 'static,
  ) -> ExecutionHandle<T>
  where
    T: Send + 'static,
  {
    let (sender, receiver) = oneshot::channel();
    let job_pipeline = pipeline.clone();
    let job: Job = Box::new(move || {
      let result = work(&job_pipeline);
      // The caller may have dropped the handle; the result is then discarded.
      let _ = sender.send(result);
    });

    match self.pool.submit(job) {
      Ok(()) => {
        event!(Level::TRACE, "Chain submitted to worker pool.");
        ExecutionHandle::pending(pipeline, receiver)
      }
      Err(submit_err) => {
        event!(Level::WARN, error = %submit_err, "Worker pool refused chain.");
        let err = match submit_err {
          SubmitError::Saturated => ChainError::Rejected {
            pipeline: pipeline.clone(),
          },
          SubmitError::ShutDown => ChainError::ShutDown {
            pipeline: pipeline.clone(),
          },
          SubmitError::Spawn(io_err) => ChainError::Spawn(io_err),
        };
        ExecutionHandle::ready(pipeline, Err(err))
      }
    }
  }
}

impl<P, R> std::fmt::Debug for ChainExecutor<P, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChainExecutor")
      .field("registry", &self.registry)
      .field("pool_shutdown", &self.pool.is_shutdown())
      .finish()
  }
}
