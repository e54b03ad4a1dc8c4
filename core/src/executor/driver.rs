// chainwork/src/executor/driver.rs

//! The chain loop shared by synchronous and pooled execution.

use crate::core::context::HandlerContext;
use crate::core::control::ChainOutcome;
use crate::core::handler::{Handler, SharedHandler};
use crate::error::{panic_message, ChainError, ChainResult, HandlerPhase};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{event, instrument, span, Level};

/// Runs `handlers` in order against `ctx`.
///
/// Returns `ShortCircuited` as soon as a handler returns `Stop`, `Completed`
/// when the sequence is exhausted (an empty sequence completes immediately),
/// or the first failure. Effects already written to `ctx` are kept on failure.
///
/// A failure in `should_skip`, `do_handle` or `on_completed` is passed to the
/// handler's `on_error` once before the chain fails. Failures are logged at
/// ERROR by `on_error`; the driver itself only traces them.
#[instrument(
    name = "chain::run",
    skip_all,
    fields(pipeline = %pipeline, num_handlers = handlers.len())
)]
pub(crate) fn run_chain<P, R>(
  pipeline: &str,
  handlers: &[SharedHandler<P, R>],
  ctx: &mut HandlerContext<P, R>,
) -> ChainResult<ChainOutcome> {
  event!(Level::DEBUG, "Chain execution starting.");

  for (handler_idx, handler) in handlers.iter().enumerate() {
    let handler = handler.as_ref();
    let handler_name = handler.name();
    let handler_span = span!(
      Level::DEBUG,
      "handler_execution",
      handler = handler_name,
      handler_index = handler_idx
    );
    let _handler_span_guard = handler_span.enter();

    let skip = match panic::catch_unwind(AssertUnwindSafe(|| handler.should_skip(ctx))) {
      Ok(skip) => skip,
      Err(payload) => return Err(fail_on_panic(pipeline, handler, ctx, HandlerPhase::ShouldSkip, payload)),
    };
    if skip {
      event!(Level::DEBUG, "Handler skipped.");
      continue;
    }

    event!(Level::TRACE, "Invoking handler.");
    let control = match panic::catch_unwind(AssertUnwindSafe(|| handler.do_handle(ctx))) {
      Ok(Ok(control)) => control,
      Ok(Err(source)) => {
        event!(Level::DEBUG, error = %source, "Handler returned an error, routing to on_error.");
        notify_error(pipeline, handler, ctx, &source)?;
        return Err(ChainError::Handler {
          pipeline: pipeline.to_string(),
          handler: handler_name.to_string(),
          source,
        });
      }
      Err(payload) => return Err(fail_on_panic(pipeline, handler, ctx, HandlerPhase::DoHandle, payload)),
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_completed(ctx))) {
      return Err(fail_on_panic(pipeline, handler, ctx, HandlerPhase::OnCompleted, payload));
    }

    if !control.is_continue() {
      event!(Level::INFO, "Chain short-circuited by handler.");
      return Ok(ChainOutcome::ShortCircuited);
    }
  }

  event!(Level::DEBUG, "Chain execution completed.");
  Ok(ChainOutcome::Completed)
}

/// Reports a panic caught in `phase` to `on_error`, then builds the chain failure.
///
/// If `on_error` itself panics, that panic is the one reported.
fn fail_on_panic<P, R>(
  pipeline: &str,
  handler: &dyn Handler<P, R>,
  ctx: &mut HandlerContext<P, R>,
  phase: HandlerPhase,
  payload: Box<dyn Any + Send>,
) -> ChainError {
  let message = panic_message(payload.as_ref());
  event!(Level::DEBUG, %phase, panic = %message, "Handler panicked, routing to on_error.");
  let source = anyhow::anyhow!("handler panicked during {phase}: {message}");
  if let Err(callback_failure) = notify_error(pipeline, handler, ctx, &source) {
    return callback_failure;
  }
  ChainError::Panicked {
    pipeline: pipeline.to_string(),
    handler: handler.name().to_string(),
    phase,
    message,
  }
}

/// Calls `on_error`, turning a panic inside it into `ChainError::Panicked`.
fn notify_error<P, R>(
  pipeline: &str,
  handler: &dyn Handler<P, R>,
  ctx: &mut HandlerContext<P, R>,
  source: &anyhow::Error,
) -> ChainResult<()> {
  panic::catch_unwind(AssertUnwindSafe(|| handler.on_error(ctx, source))).map_err(|payload| {
    let message = panic_message(payload.as_ref());
    event!(Level::ERROR, panic = %message, "on_error panicked.");
    ChainError::Panicked {
      pipeline: pipeline.to_string(),
      handler: handler.name().to_string(),
      phase: HandlerPhase::OnError,
      message,
    }
  })
}
