// chainwork/src/core/control.rs

//! Defines signals for controlling chain flow and the outcome of a chain run.

/// Signal from a handler indicating whether the chain should continue or stop.
///
/// Together with the `Err` arm of `Handler::do_handle` this forms the three
/// possible results of a step: continue, stop successfully, or fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerControl {
  /// Proceed to the next handler in the chain.
  Continue,
  /// Stop the chain here. This is a successful termination, not an error.
  Stop,
}

impl HandlerControl {
  /// Maps the boolean convention (`true` = keep going) onto a control signal.
  pub fn from_continue(proceed: bool) -> Self {
    if proceed {
      HandlerControl::Continue
    } else {
      HandlerControl::Stop
    }
  }

  pub fn is_continue(self) -> bool {
    self == HandlerControl::Continue
  }
}

/// Outcome of a chain run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
  /// Every handler either ran and returned `Continue` or was skipped.
  Completed,
  /// A handler returned `HandlerControl::Stop`; later handlers did not run.
  ShortCircuited,
}
