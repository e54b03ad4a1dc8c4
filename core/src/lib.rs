// src/lib.rs

//! Chainwork: a pluggable handler-chain engine for Rust.
//!
//! A pipeline is a named, ordered sequence of handlers run against one
//! mutable context. Each handler decides whether the chain continues, stops
//! successfully, or fails. Chainwork provides:
//!  - `HandlerContext<P, R>`: request, response and a loosely typed attribute map.
//!  - The `Handler<P, R>` contract with skip, completion and error callbacks.
//!  - `ChainRegistry<P, R>`: a concurrent store of named pipelines.
//!  - `ChainExecutor<P, R>`: runs a pipeline on the calling thread, or on a
//!    bounded worker pool with a configurable saturation policy.

pub mod core;
pub mod error;
pub mod executor;
pub mod pool;
pub mod registry;

// --- Re-exports for the Public API ---

pub use crate::core::context::{AttributeKey, AttributeValue, HandlerContext};
pub use crate::core::control::{ChainOutcome, HandlerControl};
pub use crate::core::handler::{FnHandler, Handler, SharedHandler};

pub use crate::error::{ChainError, ChainResult, HandlerPhase};

pub use crate::executor::{ChainExecutor, Completion, ExecutionHandle};
pub use crate::pool::{BoundedWorkerPool, Job, PoolConfig, SaturationPolicy, SubmitError, WorkerPool};
pub use crate::registry::{ChainRegistry, OrderingPolicy, DEFAULT_ORDER};

/*
    Core Workflow:
    1. Pick a request type `P` and a response type `R`.
    2. Implement `Handler<P, R>` for each step (or wrap closures in `FnHandler`).
    3. Create an `Arc<ChainRegistry<P, R>>` and `register` the handlers under a
       pipeline name, in the order they should run (or with
       `OrderingPolicy::ByOrder` and `register_with_order`).
    4. Create a `ChainExecutor` over the registry, optionally with a
       `PoolConfig` or an existing `WorkerPool`.
    5. Build a `HandlerContext::new(request)` per invocation and call
       `execute(name, &mut ctx)` or `execute_async(name, ctx).await`.
    6. Call `shutdown()` when the host stops serving.
*/
