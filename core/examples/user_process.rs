// chainwork/examples/user_process.rs

use chainwork::{ChainExecutor, ChainOutcome, ChainRegistry, ChainResult, Handler, HandlerContext, HandlerControl};
use std::sync::Arc;
use tracing::info;

// 1. Define the request and response types shared by every handler in the chain
#[derive(Clone, Debug, Default)]
struct UserRequest {
  user_id: Option<u64>,
  display_name: String,
}

type UserContext = HandlerContext<UserRequest, String>;

// 2. Implement handlers. Each one is a small, stateless struct.
struct ValidateUser;

impl Handler<UserRequest, String> for ValidateUser {
  fn do_handle(&self, ctx: &mut UserContext) -> anyhow::Result<HandlerControl> {
    if ctx.request().user_id.is_none() {
      info!("No user id, short-circuiting");
      ctx.set_response("invalid".to_string());
      return Ok(HandlerControl::Stop);
    }
    Ok(HandlerControl::Continue)
  }

  fn name(&self) -> &str {
    "validate"
  }
}

struct ProcessUser;

impl Handler<UserRequest, String> for ProcessUser {
  fn do_handle(&self, ctx: &mut UserContext) -> anyhow::Result<HandlerControl> {
    let greeting = format!("processed {}", ctx.request().display_name);
    info!("{}", greeting);
    ctx.set_attribute("user.greeting", greeting);
    ctx.set_response("ok".to_string());
    Ok(HandlerControl::Continue)
  }

  fn on_completed(&self, ctx: &mut UserContext) {
    info!(attributes = ?ctx.attribute_keys().collect::<Vec<_>>(), "ProcessUser completed");
  }

  fn name(&self) -> &str {
    "process"
  }
}

fn main() -> ChainResult<()> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

  info!("--- User Process Chain Example ---");

  // 3. Register handlers under a pipeline name. Registration order is execution order.
  let registry = Arc::new(ChainRegistry::<UserRequest, String>::new());
  registry.register("user-process", Arc::new(ValidateUser));
  registry.register("user-process", Arc::new(ProcessUser));

  // 4. Build an executor over the registry
  let executor = ChainExecutor::new(registry);

  // 5. A valid request runs the whole chain
  let mut valid = HandlerContext::new(UserRequest {
    user_id: Some(42),
    display_name: "Ada".to_string(),
  });
  let outcome = executor.run("user-process", &mut valid)?;
  assert_eq!(outcome, ChainOutcome::Completed);
  info!("Valid request -> {:?}", valid.response());

  // 6. A request without a user id stops at the validator
  let mut invalid = HandlerContext::new(UserRequest::default());
  let response = executor.execute("user-process", &mut invalid)?;
  assert_eq!(response.as_deref(), Some("invalid"));
  info!("Invalid request -> {:?}", response);

  executor.shutdown();
  Ok(())
}
