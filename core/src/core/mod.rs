pub mod context;
pub mod control;
pub mod handler;

// Re-export key types for easier access from other modules (and lib.rs)
pub use context::{AttributeKey, AttributeValue, HandlerContext};
pub use control::{ChainOutcome, HandlerControl};
pub use handler::{FnHandler, Handler, SharedHandler};
