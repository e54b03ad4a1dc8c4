// chainwork/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Which part of the handler contract was running when a panic was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerPhase {
  ShouldSkip,
  DoHandle,
  OnCompleted,
  OnError,
}

impl std::fmt::Display for HandlerPhase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      HandlerPhase::ShouldSkip => "should_skip",
      HandlerPhase::DoHandle => "do_handle",
      HandlerPhase::OnCompleted => "on_completed",
      HandlerPhase::OnError => "on_error",
    };
    f.write_str(label)
  }
}

#[derive(Debug, Error)]
pub enum ChainError {
  #[error("Handler '{handler}' failed in pipeline '{pipeline}'. Source: {source}")]
  Handler {
    pipeline: String,
    handler: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Handler '{handler}' panicked during {phase} in pipeline '{pipeline}': {message}")]
  Panicked {
    pipeline: String,
    handler: String,
    phase: HandlerPhase,
    message: String,
  },

  #[error("Attribute '{key}' is present but is not of type {expected}")]
  AttributeTypeMismatch { key: String, expected: &'static str },

  #[error("Worker pool is saturated; pipeline '{pipeline}' was rejected")]
  Rejected { pipeline: String },

  #[error("Executor is shut down; pipeline '{pipeline}' was not accepted")]
  ShutDown { pipeline: String },

  #[error("Worker dropped the result of pipeline '{pipeline}' without completing it")]
  WorkerLost { pipeline: String },

  #[error("Invalid worker pool configuration: {0}")]
  InvalidConfig(String),

  #[error("Failed to spawn worker thread: {0}")]
  Spawn(#[from] std::io::Error),
}

impl ChainError {
  /// Name of the pipeline the error belongs to, when it is tied to one.
  pub fn pipeline(&self) -> Option<&str> {
    match self {
      ChainError::Handler { pipeline, .. }
      | ChainError::Panicked { pipeline, .. }
      | ChainError::Rejected { pipeline }
      | ChainError::ShutDown { pipeline }
      | ChainError::WorkerLost { pipeline } => Some(pipeline),
      _ => None,
    }
  }

  /// True for failures raised by a handler (error return or panic), as opposed
  /// to failures of the executor or pool around it.
  pub fn is_handler_failure(&self) -> bool {
    matches!(self, ChainError::Handler { .. } | ChainError::Panicked { .. })
  }
}

pub type ChainResult<T, E = ChainError> = std::result::Result<T, E>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
