// tests/async_execution_tests.rs
mod common;

use chainwork::{
  BoundedWorkerPool, ChainError, ChainExecutor, ChainOutcome, ChainRegistry, FnHandler, HandlerContext, HandlerControl,
  PoolConfig, SaturationPolicy, WorkerPool,
};
use common::*;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Pipeline "echo": copies the request label into the response after a short pause.
fn echo_registry() -> Arc<ChainRegistry<TestRequest, String>> {
  let registry = Arc::new(ChainRegistry::new());
  registry.register(
    "echo",
    FnHandler::new("echo", |ctx: &mut TestContext| {
      thread::sleep(Duration::from_millis(2));
      let reply = format!("echo:{}", ctx.request().label);
      ctx.set_attribute("echo.thread", thread::current().name().map(str::to_string));
      ctx.set_response(reply);
      Ok(HandlerControl::Continue)
    })
    .into_shared(),
  );
  registry
}

fn labelled(label: &str) -> TestContext {
  HandlerContext::new(TestRequest {
    label: label.to_string(),
    ..Default::default()
  })
}

/// Registers a pipeline "gate" whose single handler blocks until the returned sender is dropped.
fn gate_pipeline(registry: &ChainRegistry<TestRequest, String>) -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
  let (release_tx, release_rx) = mpsc::channel::<()>();
  let (started_tx, started_rx) = mpsc::channel::<()>();
  let release_rx = parking_lot::Mutex::new(release_rx);
  let started_tx = parking_lot::Mutex::new(started_tx);
  registry.register(
    "gate",
    FnHandler::new("gate", move |_ctx: &mut TestContext| {
      let _ = started_tx.lock().send(());
      let _ = release_rx.lock().recv();
      Ok(HandlerControl::Continue)
    })
    .into_shared(),
  );
  (release_tx, started_rx)
}

#[tokio::test]
async fn test_execute_async_resolves_to_response() {
  setup_tracing();
  let executor = ChainExecutor::new(echo_registry());

  let response = executor.execute_async("echo", labelled("hi")).await.unwrap();
  assert_eq!(response.as_deref(), Some("echo:hi"));

  executor.shutdown();
  assert!(executor.await_termination(WAIT));
}

#[tokio::test]
async fn test_concurrent_invocations_do_not_interfere() {
  setup_tracing();
  let executor = ChainExecutor::with_config(echo_registry(), PoolConfig::fixed(4)).unwrap();

  let handles: Vec<_> = (0..32)
    .map(|i| executor.execute_async("echo", labelled(&format!("req-{i}"))))
    .collect();

  for (i, handle) in handles.into_iter().enumerate() {
    let response = handle.await.unwrap();
    assert_eq!(response, Some(format!("echo:req-{i}")));
  }
  executor.shutdown();
  assert!(executor.await_termination(WAIT));
}

#[tokio::test]
async fn test_async_failure_surfaces_through_handle() {
  setup_tracing();
  let log = new_log();
  let registry = Arc::new(ChainRegistry::new());
  registry.register("broken", RecordingHandler::new("a", Behavior::Fail("async failure"), &log).shared());
  registry.register("broken", RecordingHandler::new("b", Behavior::Continue, &log).shared());
  let executor = ChainExecutor::new(registry);

  let handle = executor.execute_async("broken", new_context());
  match handle.await {
    Err(ChainError::Handler { handler, source, .. }) => {
      assert_eq!(handler, "a");
      assert_eq!(source.to_string(), "async failure");
    }
    other => panic!("Expected ChainError::Handler, got {:?}", other),
  }
  assert_eq!(events(&log), vec!["a:handle", "a:error"]);
}

#[tokio::test]
async fn test_async_with_context_keeps_attributes_even_on_failure() {
  setup_tracing();
  let registry = Arc::new(ChainRegistry::new());
  registry.register(
    "audit",
    FnHandler::new("mark", |ctx: &mut TestContext| {
      ctx.set_attribute("audit.step", 1u32);
      Ok(HandlerControl::Continue)
    })
    .into_shared(),
  );
  registry.register(
    "audit",
    FnHandler::new("fail", |_ctx: &mut TestContext| Err(anyhow::anyhow!("audit store unavailable"))).into_shared(),
  );
  let executor = ChainExecutor::new(registry);

  let completion = executor.execute_async_with_context("audit", new_context()).await.unwrap();
  assert!(matches!(completion.result, Err(ChainError::Handler { .. })));
  assert_eq!(completion.context.get_attribute::<u32>("audit.step").unwrap(), Some(&1));
  assert!(completion.into_response().is_err());
}

#[tokio::test]
async fn test_chain_runs_on_pool_worker_thread() {
  setup_tracing();
  let config = PoolConfig::fixed(1).with_thread_name_prefix("echo-pool");
  let executor = ChainExecutor::with_config(echo_registry(), config).unwrap();

  let completion = executor.execute_async_with_context("echo", labelled("x")).await.unwrap();
  assert_eq!(completion.result.as_ref().ok(), Some(&ChainOutcome::Completed));
  let worker_name = completion
    .context
    .get_attribute::<Option<String>>("echo.thread")
    .unwrap()
    .cloned()
    .flatten()
    .unwrap_or_default();
  assert!(worker_name.starts_with("echo-pool-"), "ran on {worker_name}");
}

#[test]
fn test_reject_policy_reports_rejection_through_handle() {
  setup_tracing();
  let registry = echo_registry();
  let (release, started) = gate_pipeline(&registry);
  let config = PoolConfig::fixed(1)
    .with_queue_capacity(1)
    .with_saturation(SaturationPolicy::Reject);
  let executor = ChainExecutor::with_config(registry, config).unwrap();

  let blocked = executor.execute_async("gate", new_context());
  started.recv_timeout(WAIT).unwrap();
  let queued = executor.execute_async("echo", labelled("queued"));
  let rejected = executor.execute_async("echo", labelled("rejected"));

  assert_eq!(rejected.pipeline(), "echo");
  match rejected.wait() {
    Err(ChainError::Rejected { pipeline }) => assert_eq!(pipeline, "echo"),
    other => panic!("Expected ChainError::Rejected, got {:?}", other),
  }

  drop(release);
  assert_eq!(blocked.wait().unwrap(), None);
  assert_eq!(queued.wait().unwrap().as_deref(), Some("echo:queued"));
}

#[test]
fn test_caller_runs_policy_executes_inline_when_saturated() {
  setup_tracing();
  let registry = echo_registry();
  let (release, started) = gate_pipeline(&registry);
  let config = PoolConfig::fixed(1)
    .with_queue_capacity(1)
    .with_saturation(SaturationPolicy::CallerRuns)
    .with_thread_name_prefix("inline-test");
  let executor = ChainExecutor::with_config(registry, config).unwrap();

  let blocked = executor.execute_async("gate", new_context());
  started.recv_timeout(WAIT).unwrap();
  let queued = executor.execute_async("echo", labelled("queued"));

  let caller_name = thread::current().name().map(str::to_string);
  let completion = executor
    .execute_async_with_context("echo", labelled("inline"))
    .wait()
    .unwrap();
  let ran_on = completion
    .context
    .get_attribute::<Option<String>>("echo.thread")
    .unwrap()
    .cloned()
    .flatten();
  assert_eq!(ran_on, caller_name, "saturated submission must run on the caller thread");
  assert_eq!(completion.into_response().unwrap().as_deref(), Some("echo:inline"));

  drop(release);
  blocked.wait().unwrap();
  assert_eq!(queued.wait().unwrap().as_deref(), Some("echo:queued"));
}

#[test]
fn test_block_policy_holds_submission_until_queue_has_room() {
  setup_tracing();
  let registry = echo_registry();
  let (release, started) = gate_pipeline(&registry);
  let config = PoolConfig::fixed(1)
    .with_queue_capacity(1)
    .with_saturation(SaturationPolicy::Block);
  let executor = Arc::new(ChainExecutor::with_config(registry, config).unwrap());

  let blocked = executor.execute_async("gate", new_context());
  started.recv_timeout(WAIT).unwrap();
  let queued = executor.execute_async("echo", labelled("queued"));

  let (submitted_tx, submitted_rx) = mpsc::channel();
  let submitter = {
    let executor = Arc::clone(&executor);
    thread::spawn(move || {
      let handle = executor.execute_async("echo", labelled("waited"));
      let _ = submitted_tx.send(());
      handle.wait()
    })
  };
  assert!(
    submitted_rx.recv_timeout(Duration::from_millis(50)).is_err(),
    "execute_async must block while the pool is saturated"
  );

  drop(release);
  submitted_rx.recv_timeout(WAIT).unwrap();
  assert_eq!(submitter.join().unwrap().unwrap().as_deref(), Some("echo:waited"));
  assert_eq!(blocked.wait().unwrap(), None);
  assert_eq!(queued.wait().unwrap().as_deref(), Some("echo:queued"));
}

#[test]
fn test_shutdown_drains_in_flight_work_and_refuses_new() {
  setup_tracing();
  let registry = echo_registry();
  let (release, started) = gate_pipeline(&registry);
  let executor = ChainExecutor::with_config(registry, PoolConfig::fixed(1)).unwrap();

  let in_flight = executor.execute_async("gate", new_context());
  started.recv_timeout(WAIT).unwrap();
  let queued = executor.execute_async("echo", labelled("drained"));

  executor.shutdown();
  assert!(executor.is_shutdown());
  match executor.execute_async("echo", labelled("late")).wait() {
    Err(ChainError::ShutDown { pipeline }) => assert_eq!(pipeline, "echo"),
    other => panic!("Expected ChainError::ShutDown, got {:?}", other),
  }

  // Synchronous execution does not depend on the pool.
  let mut sync_ctx = labelled("sync");
  assert_eq!(executor.execute("echo", &mut sync_ctx).unwrap().as_deref(), Some("echo:sync"));

  drop(release);
  assert!(in_flight.wait().is_ok());
  assert_eq!(queued.wait().unwrap().as_deref(), Some("echo:drained"));
  assert!(executor.await_termination(WAIT));
}

#[tokio::test]
async fn test_executors_can_share_an_external_pool() {
  setup_tracing();
  let pool: Arc<dyn WorkerPool> = Arc::new(BoundedWorkerPool::new(PoolConfig::fixed(2)).unwrap());

  let echo = ChainExecutor::with_pool(echo_registry(), Arc::clone(&pool));
  let numbers_registry = Arc::new(ChainRegistry::<u32, u32>::new());
  numbers_registry.register(
    "double",
    FnHandler::new("double", |ctx: &mut HandlerContext<u32, u32>| {
      let doubled = ctx.request() * 2;
      ctx.set_response(doubled);
      Ok(HandlerControl::Continue)
    })
    .into_shared(),
  );
  let numbers = ChainExecutor::with_pool(numbers_registry, Arc::clone(&pool));

  let echoed = echo.execute_async("echo", labelled("shared"));
  let doubled = numbers.execute_async("double", HandlerContext::new(21));
  assert_eq!(echoed.await.unwrap().as_deref(), Some("echo:shared"));
  assert_eq!(doubled.await.unwrap(), Some(42));

  numbers.shutdown();
  assert!(echo.pool().is_shutdown());
  assert!(echo.is_shutdown(), "shutting down one executor shuts the shared pool");
  assert!(pool.await_termination(WAIT));
}

#[test]
fn test_invalid_pool_config_is_refused() {
  setup_tracing();
  let config = PoolConfig {
    core_workers: 8,
    max_workers: 2,
    ..PoolConfig::default()
  };
  match ChainExecutor::with_config(echo_registry(), config) {
    Err(ChainError::InvalidConfig(reason)) => assert!(reason.contains("core_workers")),
    other => panic!("Expected ChainError::InvalidConfig, got {:?}", other),
  }
}

#[tokio::test]
async fn test_caller_side_timeout_stops_waiting() {
  setup_tracing();
  let registry = echo_registry();
  let (release, started) = gate_pipeline(&registry);
  let executor = ChainExecutor::with_config(registry, PoolConfig::fixed(1)).unwrap();

  let handle = executor.execute_async("gate", new_context());
  started.recv_timeout(WAIT).unwrap();
  let timed_out = tokio::time::timeout(Duration::from_millis(20), handle).await;
  assert!(timed_out.is_err(), "the chain is still blocked, so the caller's deadline must fire");

  drop(release);
  executor.shutdown();
  assert!(executor.await_termination(WAIT));
}
