// chainwork/src/core/handler.rs

//! Defines the `Handler<P, R>` contract every chain step implements, and
//! `FnHandler` for building handlers from closures.

use crate::core::context::HandlerContext;
use crate::core::control::HandlerControl;
use std::sync::Arc;
use tracing::{event, Level};

/// A single step of a chain.
///
/// Handlers are shared: the same instance may be registered under several
/// pipeline names and invoked concurrently on different contexts, hence the
/// `Send + Sync` bound. Any interior mutable state is the implementor's
/// responsibility.
///
/// For each handler the executor:
/// 1. calls `should_skip`; if it returns `true` nothing else is called for this
///    handler and the chain moves on.
/// 2. calls `do_handle`.
/// 3. on `Ok(_)` calls `on_completed`, then stops the chain on `Stop` or
///    continues on `Continue`.
/// 4. on `Err(e)` calls `on_error` with `e` and then fails the whole chain with
///    that error. `on_error` cannot suppress the failure.
///
/// A panic in any of these methods is caught at the handler boundary and
/// surfaced as `ChainError::Panicked`. A panic in `should_skip`, `do_handle`
/// or `on_completed` is routed to `on_error` first, like any other failure; a
/// panic in `on_error` itself is reported without calling it again.
pub trait Handler<P, R>: Send + Sync {
  /// The step's business logic.
  fn do_handle(&self, ctx: &mut HandlerContext<P, R>) -> anyhow::Result<HandlerControl>;

  fn should_skip(&self, _ctx: &HandlerContext<P, R>) -> bool {
    false
  }

  fn on_completed(&self, _ctx: &mut HandlerContext<P, R>) {
    event!(Level::DEBUG, handler = %self.name(), "Handler completed.");
  }

  fn on_error(&self, _ctx: &mut HandlerContext<P, R>, error: &anyhow::Error) {
    event!(Level::ERROR, handler = %self.name(), error = %error, "Handler failed.");
  }

  /// Debug label used in logs and errors.
  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }
}

/// Handlers are stored and passed around as shared trait objects.
pub type SharedHandler<P, R> = Arc<dyn Handler<P, R>>;

type HandleFn<P, R> = dyn Fn(&mut HandlerContext<P, R>) -> anyhow::Result<HandlerControl> + Send + Sync;
type SkipFn<P, R> = dyn Fn(&HandlerContext<P, R>) -> bool + Send + Sync;

/// A handler built from a closure.
///
/// ```
/// use chainwork::{FnHandler, HandlerContext, HandlerControl};
///
/// let greet = FnHandler::new("greet", |ctx: &mut HandlerContext<String, String>| {
///   let reply = format!("hello {}", ctx.request());
///   ctx.set_response(reply);
///   Ok(HandlerControl::Continue)
/// })
/// .skip_if(|ctx| ctx.request().is_empty());
/// # let _ = greet;
/// ```
pub struct FnHandler<P, R> {
  name: String,
  handle_fn: Box<HandleFn<P, R>>,
  skip_fn: Option<Box<SkipFn<P, R>>>,
}

impl<P, R> FnHandler<P, R> {
  pub fn new(
    name: impl Into<String>,
    handle_fn: impl Fn(&mut HandlerContext<P, R>) -> anyhow::Result<HandlerControl> + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      handle_fn: Box::new(handle_fn),
      skip_fn: None,
    }
  }

  /// Adds a skip predicate evaluated before each invocation.
  pub fn skip_if(mut self, skip_fn: impl Fn(&HandlerContext<P, R>) -> bool + Send + Sync + 'static) -> Self {
    self.skip_fn = Some(Box::new(skip_fn));
    self
  }

  pub fn into_shared(self) -> SharedHandler<P, R>
  where
    P: 'static,
    R: 'static,
  {
    Arc::new(self)
  }
}

impl<P, R> Handler<P, R> for FnHandler<P, R> {
  fn do_handle(&self, ctx: &mut HandlerContext<P, R>) -> anyhow::Result<HandlerControl> {
    (self.handle_fn)(ctx)
  }

  fn should_skip(&self, ctx: &HandlerContext<P, R>) -> bool {
    self.skip_fn.as_ref().is_some_and(|skip| skip(ctx))
  }

  fn name(&self) -> &str {
    &self.name
  }
}

impl<P, R> std::fmt::Debug for FnHandler<P, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FnHandler")
      .field("name", &self.name)
      .field("skip_if_present", &self.skip_fn.is_some())
      .finish()
  }
}
