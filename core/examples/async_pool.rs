// chainwork/examples/async_pool.rs

use chainwork::{
  ChainError, ChainExecutor, ChainRegistry, FnHandler, HandlerContext, HandlerControl, PoolConfig, SaturationPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug)]
struct Order {
  id: u32,
  amount_cents: u64,
}

type OrderContext = HandlerContext<Order, String>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Async Execution on a Bounded Pool ---");

  // 1. Closure handlers are enough for small chains
  let registry = Arc::new(ChainRegistry::new());
  registry.register(
    "checkout",
    FnHandler::new("price-check", |ctx: &mut OrderContext| {
      if ctx.request().amount_cents == 0 {
        anyhow::bail!("order {} has no amount", ctx.request().id);
      }
      Ok(HandlerControl::Continue)
    })
    .into_shared(),
  );
  registry.register(
    "checkout",
    FnHandler::new("charge", |ctx: &mut OrderContext| {
      std::thread::sleep(Duration::from_millis(20)); // Simulate a slow payment call
      let receipt = format!("receipt-{}", ctx.request().id);
      ctx.set_response(receipt);
      Ok(HandlerControl::Continue)
    })
    .into_shared(),
  );

  // 2. Size the worker pool. Surplus submissions run on the caller when saturated.
  let config = PoolConfig::fixed(2)
    .with_queue_capacity(4)
    .with_saturation(SaturationPolicy::CallerRuns)
    .with_thread_name_prefix("checkout");
  let executor = ChainExecutor::with_config(registry, config)?;

  // 3. Submit independent requests. Each gets its own context.
  let handles: Vec<_> = (0..8u32)
    .map(|id| {
      let order = Order {
        id,
        amount_cents: if id == 3 { 0 } else { 1_000 + id as u64 },
      };
      executor.execute_async("checkout", HandlerContext::new(order))
    })
    .collect();

  // 4. Await the handles. Failures arrive as ChainError values.
  for handle in handles {
    match handle.await {
      Ok(receipt) => info!("Completed: {:?}", receipt),
      Err(ChainError::Handler { handler, source, .. }) => warn!("Handler '{}' failed: {}", handler, source),
      Err(other) => warn!("Chain did not run: {}", other),
    }
  }

  // 5. Shut down and wait for the workers to drain
  executor.shutdown();
  let drained = executor.await_termination(Duration::from_secs(5));
  info!("Pool drained: {}", drained);
  Ok(())
}
