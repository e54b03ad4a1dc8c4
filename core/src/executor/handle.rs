// chainwork/src/executor/handle.rs

use crate::core::context::HandlerContext;
use crate::core::control::ChainOutcome;
use crate::error::{ChainError, ChainResult};
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The pending result of an asynchronous chain execution.
///
/// Resolves once the worker finishes the chain. Every failure (handler error,
/// rejection by a saturated pool, submission after shutdown) arrives through
/// this handle. Dropping the handle does not cancel the run; the worker keeps
/// going and its result is discarded.
pub struct ExecutionHandle<T> {
  pipeline: String,
  state: HandleState<T>,
}

enum HandleState<T> {
  Pending(oneshot::Receiver<ChainResult<T>>),
  Ready(Option<ChainResult<T>>),
}

impl<T> ExecutionHandle<T> {
  pub(crate) fn pending(pipeline: String, receiver: oneshot::Receiver<ChainResult<T>>) -> Self {
    Self {
      pipeline,
      state: HandleState::Pending(receiver),
    }
  }

  pub(crate) fn ready(pipeline: String, result: ChainResult<T>) -> Self {
    Self {
      pipeline,
      state: HandleState::Ready(Some(result)),
    }
  }

  pub fn pipeline(&self) -> &str {
    &self.pipeline
  }

  /// Blocks the current thread until the result is available.
  ///
  /// Must not be called from a job running on the same pool with every worker
  /// busy, as the run it waits for could never be scheduled.
  pub fn wait(self) -> ChainResult<T> {
    futures::executor::block_on(self)
  }
}

// The handle never pin-projects into its fields.
impl<T> Unpin for ExecutionHandle<T> {}

impl<T> Future for ExecutionHandle<T> {
  type Output = ChainResult<T>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match &mut this.state {
      HandleState::Pending(receiver) => match Pin::new(receiver).poll(cx) {
        Poll::Ready(Ok(result)) => Poll::Ready(result),
        Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ChainError::WorkerLost {
          pipeline: this.pipeline.clone(),
        })),
        Poll::Pending => Poll::Pending,
      },
      HandleState::Ready(slot) => match slot.take() {
        Some(result) => Poll::Ready(result),
        None => panic!("ExecutionHandle for '{}' polled after completion", this.pipeline),
      },
    }
  }
}

impl<T> std::fmt::Debug for ExecutionHandle<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = match &self.state {
      HandleState::Pending(_) => "pending",
      HandleState::Ready(Some(_)) => "ready",
      HandleState::Ready(None) => "consumed",
    };
    f.debug_struct("ExecutionHandle")
      .field("pipeline", &self.pipeline)
      .field("state", &state)
      .finish()
  }
}

/// A finished asynchronous run together with the context it ran on.
///
/// `result` is the chain's own result; the context carries whatever the
/// handlers wrote before the chain ended, including on failure.
#[derive(Debug)]
pub struct Completion<P, R> {
  pub context: HandlerContext<P, R>,
  pub result: ChainResult<ChainOutcome>,
}

impl<P, R> Completion<P, R> {
  /// The response, or the chain failure.
  pub fn into_response(self) -> ChainResult<Option<R>> {
    self.result?;
    let (_, response) = self.context.into_parts();
    Ok(response)
  }
}
