//! End-to-end checks of the public engine API and the HTTP router.

use std::sync::Arc;

use axum::{
  body::{to_bytes, Body},
  http::{Request, StatusCode},
};
use caatuu_engine::config::{EngineConfig, SandboxConfig};
use caatuu_engine::domain::{ErrorKind, Severity};
use caatuu_engine::routes::build_router;
use caatuu_engine::state::AppState;
use caatuu_engine::{Challenge, ChallengeEngine, EngineError};
use serde_json::{json, Value};
use tower::ServiceExt;

fn variables_challenge() -> Challenge {
  Challenge::new("vars", "Store a number", 10, 100).with_concepts(["Variables"])
}

async fn ready_engine() -> ChallengeEngine {
  let engine = ChallengeEngine::new(SandboxConfig::default());
  engine.ensure_ready().await.expect("sandbox loads");
  engine
}

#[tokio::test]
async fn execute_before_ready_is_invalid() {
  let engine = ChallengeEngine::new(SandboxConfig::default());
  assert!(!engine.is_engine_ready());
  let report = engine.execute_code("x = 5\nprint(x)", &variables_challenge()).await;
  assert!(!report.validation_result.is_valid);
  assert_eq!(report.validation_result.score, 0);
  assert_eq!(report.validation_result.errors.unwrap()[0].kind, ErrorKind::Runtime);
  assert_eq!(report.output.len(), 1);
  // execute_code never loads the runtime on its own.
  assert!(!engine.get_engine_status().ready);
  assert!(!engine.get_engine_status().initializing);
}

#[tokio::test]
async fn variables_scenario_scores_full_and_earns_200_xp() {
  let engine = ready_engine().await;
  let ch = variables_challenge();
  engine.start_challenge_session(&ch.id, "student").await;

  let submission = engine.submit_code("x = 5\nprint(x)", &ch).await.unwrap();
  assert_eq!(submission.validation_result.score, 100);
  assert!(submission.validation_result.is_valid);
  assert_eq!(submission.output, "5\n");

  let session = engine.get_current_session().await.unwrap();
  assert_eq!(session.attempts, 1);
  assert_eq!(session.output, vec!["5"]);
  assert_eq!(session.current_code, "x = 5\nprint(x)");
  assert_eq!(engine.calculate_xp(&ch, &submission, &session), 200);
}

#[tokio::test]
async fn broken_syntax_scores_zero_with_single_error() {
  let engine = ready_engine().await;
  let report = engine.execute_code("if x print(x)", &variables_challenge()).await;
  let result = report.validation_result;
  assert_eq!(result.score, 0);
  assert!(!result.is_valid);
  let errors = result.errors.unwrap();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].kind, ErrorKind::Syntax);
  assert_eq!(errors[0].severity, Severity::Error);
}

#[tokio::test]
async fn partial_concepts_cap_score_and_name_the_gap() {
  let engine = ready_engine().await;
  let ch = Challenge::new("pc", "Partial", 10, 100).with_concepts(["Variables", "Loops"]);
  let report = engine.execute_code("x = 5\nprint(x)", &ch).await;
  assert!(report.validation_result.score <= 30 + 40);
  assert!(report.validation_result.feedback.contains("Loops"));
}

#[tokio::test]
async fn reference_match_is_perfect() {
  let engine = ready_engine().await;
  let ch = Challenge::new("loop", "Loop", 5, 50)
    .with_concepts(["Loops", "Functions"])
    .with_solution("for i in range(3):\n    print(i)\n");
  let report = engine.execute_code("for i in range(3):\n  print(i)", &ch).await;
  assert_eq!(report.validation_result.score, 100);
  assert!(report.validation_result.is_valid);
  assert_eq!(report.output, vec!["0", "1", "2"]);
}

#[tokio::test]
async fn runtime_fault_is_reported_not_thrown() {
  let engine = ready_engine().await;
  let ch = Challenge::new("f", "Fault", 5, 50).with_concepts(["Output"]);
  let report = engine.execute_code("print('before')\nprint(1 / 0)\n", &ch).await;
  assert_eq!(report.validation_result.score, 0);
  assert!(!report.validation_result.is_valid);
  assert_eq!(report.output[0], "before");
  assert!(report.output[1].starts_with("Error: ZeroDivisionError"), "{:?}", report.output);
  assert!(engine.is_engine_ready());
}

#[tokio::test]
async fn attempts_increase_by_one_per_submission() {
  let engine = ready_engine().await;
  let ch = variables_challenge();
  engine.start_challenge_session(&ch.id, "student").await;
  let codes = ["print(1)", "if x print(x)", "x = 5\nprint(x)", "print(y)"];
  for (i, code) in codes.iter().enumerate() {
    engine.submit_code(code, &ch).await.unwrap();
    let session = engine.get_current_session().await.unwrap();
    assert_eq!(session.attempts as usize, i + 1);
  }
  let last = engine.get_current_session().await.unwrap().last_validation.unwrap();
  assert_eq!(last.errors.unwrap()[0].kind, ErrorKind::Runtime);
}

#[tokio::test]
async fn first_attempt_earns_more_than_later_ones() {
  let engine = ready_engine().await;
  let ch = variables_challenge();
  engine.start_challenge_session(&ch.id, "a").await;
  let first = engine.submit_code("x = 5\nprint(x)", &ch).await.unwrap();
  let s1 = engine.get_current_session().await.unwrap();
  let xp_first = engine.calculate_xp(&ch, &first, &s1);

  let second = engine.submit_code("x = 5\nprint(x)", &ch).await.unwrap();
  let s2 = engine.get_current_session().await.unwrap();
  let xp_second = engine.calculate_xp(&ch, &second, &s2);
  assert!(xp_first > xp_second);
}

#[tokio::test]
async fn second_session_supersedes_first() {
  let engine = ChallengeEngine::new(SandboxConfig::default());
  let (a, b) = tokio::join!(
    engine.start_challenge_session("vars", "student"),
    engine.start_challenge_session("vars", "student"),
  );
  assert_ne!(a.id, b.id);
  let held = engine.session_for("student", "vars").await.unwrap();
  let current = engine.get_current_session().await.unwrap();
  assert_eq!(held.id, current.id);
  assert!(held.id == a.id || held.id == b.id);

  let third = engine.start_challenge_session("vars", "student").await;
  assert_eq!(engine.get_current_session().await.unwrap().id, third.id);
  assert_ne!(engine.get_current_session().await.unwrap().id, a.id);
}

#[tokio::test]
async fn submit_needs_ready_runtime_and_a_session() {
  let engine = ChallengeEngine::new(SandboxConfig::default());
  let ch = variables_challenge();
  engine.start_challenge_session(&ch.id, "student").await;
  assert_eq!(engine.submit_code("x = 5", &ch).await.unwrap_err(), EngineError::RuntimeNotReady);

  engine.ensure_ready().await.unwrap();
  engine.end_session().await;
  assert!(engine.get_current_session().await.is_none());
  assert_eq!(engine.submit_code("x = 5", &ch).await.unwrap_err(), EngineError::NoActiveSession);
}

#[tokio::test]
async fn concurrent_submissions_are_serialized_per_user() {
  let engine = Arc::new(ready_engine().await);
  let ch = Challenge::new("out", "Output", 5, 10).with_concepts(["Output"]);
  for user in ["ana", "ben", "cy"] {
    engine.start_challenge_session(&ch.id, user).await;
  }
  let mut tasks = Vec::new();
  for user in ["ana", "ben", "cy"] {
    let engine = engine.clone();
    let ch = ch.clone();
    tasks.push(tokio::spawn(async move {
      let code = format!("for i in range(50):\n    print('{user}')\n");
      engine.submit_code_for(user, &code, &ch).await.unwrap()
    }));
  }
  for (task, user) in tasks.into_iter().zip(["ana", "ben", "cy"]) {
    let submission = task.await.unwrap();
    assert!(submission.output.lines().all(|l| l == user), "interleaved output for {user}");
    assert_eq!(submission.output.lines().count(), 50);
  }
}

#[tokio::test]
async fn realtime_never_touches_sessions() {
  let engine = ChallengeEngine::new(SandboxConfig::default());
  let ch = Challenge::new("rt", "Realtime", 5, 10).with_concepts(["Functions"]);
  engine.start_challenge_session(&ch.id, "student").await;
  let errors = engine.validate_realtime("print('hi')", &ch);
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].severity, Severity::Warning);
  assert_eq!(engine.get_current_session().await.unwrap().attempts, 0);
}

#[tokio::test]
async fn runaway_code_is_bounded() {
  let config = SandboxConfig { max_operations: 50_000, ..SandboxConfig::default() };
  let engine = ChallengeEngine::new(config);
  engine.ensure_ready().await.unwrap();
  let ch = Challenge::new("inf", "Forever", 5, 10).with_concepts(["Loops"]);
  let report = engine.execute_code("while True:\n    x = 1\n", &ch).await;
  assert_eq!(report.validation_result.score, 0);
  assert!(report.output.iter().any(|l| l.contains("TimeoutError")));

  let after = engine.execute_code("print('still alive')", &ch).await;
  assert_eq!(after.output, vec!["still alive"]);
}

// ---- HTTP ----

fn app() -> (Arc<AppState>, axum::Router) {
  let state = Arc::new(AppState::from_config(EngineConfig::default()));
  (state.clone(), build_router(state))
}

async fn call(router: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut req = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      req = req.header("content-type", "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, value)
}

#[tokio::test]
async fn http_health_and_catalog() {
  let (_, router) = app();
  let (status, body) = call(&router, "GET", "/api/v1/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["ok"], true);

  let (status, body) = call(&router, "GET", "/api/v1/challenges", None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body.as_array().unwrap().iter().any(|c| c["id"] == "hello-world"));
  assert!(body[0].get("solution").is_none());

  let (status, body) = call(&router, "GET", "/api/v1/challenge?id=missing", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["code"], "unknown_challenge");
}

#[tokio::test]
async fn http_submit_flow() {
  let (state, router) = app();

  let (status, body) = call(&router, "GET", "/api/v1/status", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["ready"], false);

  let who = json!({ "userId": "u1", "challengeId": "store-a-number" });
  let (status, body) = call(&router, "POST", "/api/v1/session", Some(who.clone())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["attempts"], 0);

  let submit = json!({ "userId": "u1", "challengeId": "store-a-number", "code": "x = 5\nprint(x)" });
  let (status, body) = call(&router, "POST", "/api/v1/submit", Some(submit.clone())).await;
  assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
  assert_eq!(body["code"], "runtime_not_ready");

  state.engine.ensure_ready().await.unwrap();
  let (status, body) = call(&router, "POST", "/api/v1/submit", Some(submit)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["submission"]["validationResult"]["score"], 100);
  assert_eq!(body["submission"]["validationResult"]["isValid"], true);
  assert_eq!(body["session"]["attempts"], 1);
  assert_eq!(body["xp"]["total"], 200);

  let (status, body) = call(&router, "POST", "/api/v1/hint", Some(who.clone())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["hint"]["id"], "var-1");
  assert_eq!(body["remaining"], 0);

  let (_, body) = call(&router, "POST", "/api/v1/session/end", Some(who.clone())).await;
  assert_eq!(body["ended"], true);
  let (status, body) = call(&router, "POST", "/api/v1/hint", Some(who)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "no_active_session");
}

#[tokio::test]
async fn http_execute_and_realtime() {
  let (state, router) = app();
  state.engine.ensure_ready().await.unwrap();

  let run = json!({ "challengeId": "count-to-five", "code": "for i in range(1, 6):\n    print(i)\n" });
  let (status, body) = call(&router, "POST", "/api/v1/execute", Some(run)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["output"], json!(["1", "2", "3", "4", "5"]));
  assert_eq!(body["validationResult"]["score"], 100);

  let draft = json!({ "challengeId": "count-to-five", "code": "print(1" });
  let (status, body) = call(&router, "POST", "/api/v1/realtime", Some(draft)).await;
  assert_eq!(status, StatusCode::OK);
  let errors = body["errors"].as_array().unwrap();
  assert_eq!(errors[0]["type"], "syntax");
  assert!(errors.iter().any(|e| e["severity"] == "warning"));
}
