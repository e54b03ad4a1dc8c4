// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use chainwork::{Handler, HandlerContext, HandlerControl, SharedHandler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Level;

// --- Common Request / Context Types ---
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestRequest {
  pub user_id: Option<u64>,
  pub label: String,
}

pub type TestContext = HandlerContext<TestRequest, String>;
pub type TestHandler = SharedHandler<TestRequest, String>;

pub fn new_context() -> TestContext {
  HandlerContext::new(TestRequest::default())
}

/// Shared, ordered record of handler callbacks, e.g. `"a:handle"`, `"a:completed"`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> EventLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
  log.lock().clone()
}

// --- Recording Handler ---
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
  Continue,
  Stop,
  Fail(&'static str),
  Panic(&'static str),
}

pub struct RecordingHandler {
  name: String,
  behavior: Behavior,
  skip: bool,
  response: Option<&'static str>,
  log: EventLog,
  invocations: AtomicUsize,
}

impl RecordingHandler {
  pub fn new(name: &str, behavior: Behavior, log: &EventLog) -> Self {
    Self {
      name: name.to_string(),
      behavior,
      skip: false,
      response: None,
      log: Arc::clone(log),
      invocations: AtomicUsize::new(0),
    }
  }

  pub fn skipped(mut self) -> Self {
    self.skip = true;
    self
  }

  pub fn responding(mut self, response: &'static str) -> Self {
    self.response = Some(response);
    self
  }

  pub fn shared(self) -> TestHandler {
    Arc::new(self)
  }

  pub fn invocations(&self) -> usize {
    self.invocations.load(Ordering::SeqCst)
  }

  fn record(&self, what: &str) {
    self.log.lock().push(format!("{}:{}", self.name, what));
  }
}

impl Handler<TestRequest, String> for RecordingHandler {
  fn do_handle(&self, ctx: &mut TestContext) -> anyhow::Result<HandlerControl> {
    self.invocations.fetch_add(1, Ordering::SeqCst);
    self.record("handle");
    if let Some(response) = self.response {
      ctx.set_response(response.to_string());
    }
    tracing::debug!(target: "test_handlers", handler = %self.name, "executed");
    match self.behavior {
      Behavior::Continue => Ok(HandlerControl::Continue),
      Behavior::Stop => Ok(HandlerControl::Stop),
      Behavior::Fail(message) => Err(anyhow::anyhow!(message)),
      Behavior::Panic(message) => panic!("{}", message),
    }
  }

  fn should_skip(&self, _ctx: &TestContext) -> bool {
    if self.skip {
      self.record("skipped");
    }
    self.skip
  }

  fn on_completed(&self, _ctx: &mut TestContext) {
    self.record("completed");
  }

  fn on_error(&self, _ctx: &mut TestContext, _error: &anyhow::Error) {
    self.record("error");
  }

  fn name(&self) -> &str {
    &self.name
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
