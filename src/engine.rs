//! The engine facade: runtime lifecycle, execution, validation, sessions and XP.
//!
//! One `ChallengeEngine` per process, shared by `Arc`. The single-user calls
//! (`submit_code`, `get_current_session`, `end_session`, `request_hint`) act on the
//! session most recently started; the `*_for` variants take the user explicitly.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::domain::{
  Challenge, ChallengeSession, CodeSubmission, EngineStatus, ErrorKind, ExecutionOutcome, ExecutionReport, Hint,
  ValidationError, ValidationResult,
};
use crate::error::{EngineError, RuntimeError};
use crate::runtime::RuntimeHandle;
use crate::sandbox::Sandbox;
use crate::scoring::{self, XpBreakdown};
use crate::session::{SessionKey, SessionStore};
use crate::validator;

pub const NOT_READY_MESSAGE: &str = "Python runtime is not ready yet. Please wait for it to finish loading.";

/// What one evaluation produced, before it is tied to a session.
struct Evaluation {
  output: Vec<String>,
  raw_output: String,
  result: ValidationResult,
  wall_time_ms: u64,
}

#[derive(Debug)]
pub struct ChallengeEngine {
  runtime: Arc<RuntimeHandle>,
  sandbox: Sandbox,
  sessions: SessionStore,
  current: RwLock<Option<SessionKey>>,
}

impl ChallengeEngine {
  pub fn new(config: SandboxConfig) -> Self {
    Self::with_runtime(Arc::new(RuntimeHandle::new(config)))
  }

  pub fn with_runtime(runtime: Arc<RuntimeHandle>) -> Self {
    Self {
      sandbox: Sandbox::new(runtime.clone()),
      runtime,
      sessions: SessionStore::new(),
      current: RwLock::new(None),
    }
  }

  pub fn runtime(&self) -> &Arc<RuntimeHandle> {
    &self.runtime
  }

  pub fn sessions(&self) -> &SessionStore {
    &self.sessions
  }

  // ---- Runtime ----

  pub async fn ensure_ready(&self) -> Result<(), RuntimeError> {
    self.runtime.ensure_ready().await
  }

  pub fn is_engine_ready(&self) -> bool {
    self.runtime.is_ready()
  }

  pub fn get_engine_status(&self) -> EngineStatus {
    self.runtime.status()
  }

  /// Runs code as-is. Does not load the runtime.
  pub async fn run(&self, code: &str) -> Result<ExecutionOutcome, RuntimeError> {
    self.sandbox.run(code).await
  }

  // ---- Evaluation ----

  async fn evaluate(&self, code: &str, challenge: &Challenge) -> Result<Evaluation, RuntimeError> {
    if challenge.validator.is_none() {
      if let Some(result) = validator::validate_syntax(code) {
        let output = result
          .errors
          .iter()
          .flatten()
          .map(|e| format!("Error: {}", e.message))
          .collect::<Vec<_>>();
        return Ok(Evaluation { raw_output: output.join("\n"), output, result, wall_time_ms: 0 });
      }
    }
    let outcome = self.sandbox.run(code).await?;
    let result = validator::validate(code, challenge, &outcome);
    let output = outcome.output_lines();
    let raw_output = if outcome.stderr.is_empty() {
      outcome.stdout.clone()
    } else {
      format!("{}{}", outcome.stdout, outcome.stderr)
    };
    Ok(Evaluation { output, raw_output, result, wall_time_ms: outcome.wall_time_ms })
  }

  /// Runs and grades `code` without touching any session. Never fails: problems
  /// are reported inside the validation result.
  #[instrument(level = "info", skip(self, code, challenge), fields(id = %challenge.id, code_len = code.len()))]
  pub async fn execute_code(&self, code: &str, challenge: &Challenge) -> ExecutionReport {
    if !self.runtime.is_ready() {
      warn!(target: "challenge", id = %challenge.id, "execute_code before the runtime is ready");
      return ExecutionReport {
        output: vec![NOT_READY_MESSAGE.to_string()],
        validation_result: ValidationResult::failure(ErrorKind::Runtime, NOT_READY_MESSAGE),
        execution_time_ms: 0,
      };
    }
    match self.evaluate(code, challenge).await {
      Ok(eval) => {
        info!(target: "challenge", id = %challenge.id, score = eval.result.score, valid = eval.result.is_valid, "Code executed");
        ExecutionReport { output: eval.output, validation_result: eval.result, execution_time_ms: eval.wall_time_ms }
      }
      Err(e) => {
        warn!(target: "challenge", id = %challenge.id, error = %e, "Execution failed");
        let message = format!("Execution failed: {e}");
        ExecutionReport {
          output: vec![message.clone()],
          validation_result: ValidationResult::failure(ErrorKind::Runtime, message),
          execution_time_ms: 0,
        }
      }
    }
  }

  pub fn validate_realtime(&self, code: &str, challenge: &Challenge) -> Vec<ValidationError> {
    validator::validate_realtime(code, challenge)
  }

  // ---- Sessions ----

  /// Creates a fresh session for the pair, replacing any earlier one, and makes it current.
  #[instrument(level = "info", skip(self))]
  pub async fn start_challenge_session(&self, challenge_id: &str, user_id: &str) -> ChallengeSession {
    let session = ChallengeSession::new(challenge_id, user_id);
    let key = SessionKey::of(&session);
    self.sessions.insert(session.clone()).await;
    *self.current.write().await = Some(key);
    info!(target: "challenge", session_id = %session.id, %challenge_id, %user_id, "Session started");
    session
  }

  pub async fn get_current_session(&self) -> Option<ChallengeSession> {
    let key = self.current.read().await.clone()?;
    self.sessions.get(&key).await
  }

  pub async fn session_for(&self, user_id: &str, challenge_id: &str) -> Option<ChallengeSession> {
    self.sessions.get(&SessionKey::new(user_id, challenge_id)).await
  }

  /// Discards the current session. Earlier submissions are unaffected.
  pub async fn end_session(&self) {
    if let Some(key) = self.current.write().await.take() {
      if let Some(s) = self.sessions.evict(&key).await {
        info!(target: "challenge", session_id = %s.id, attempts = s.attempts, "Session ended");
      }
    }
  }

  pub async fn end_session_for(&self, user_id: &str, challenge_id: &str) -> Option<ChallengeSession> {
    let key = SessionKey::new(user_id, challenge_id);
    {
      let mut current = self.current.write().await;
      if current.as_ref() == Some(&key) {
        *current = None;
      }
    }
    let ended = self.sessions.evict(&key).await;
    if let Some(s) = &ended {
      info!(target: "challenge", session_id = %s.id, attempts = s.attempts, "Session ended");
    }
    ended
  }

  pub async fn evict_idle_sessions(&self, ttl: Duration) -> usize {
    let evicted = self.sessions.evict_idle(ttl).await;
    if evicted > 0 {
      let mut current = self.current.write().await;
      let stale = match current.as_ref() {
        Some(key) => self.sessions.get(key).await.is_none(),
        None => false,
      };
      if stale {
        *current = None;
      }
    }
    evicted
  }

  async fn current_key_for(&self, challenge: &Challenge) -> Result<SessionKey, EngineError> {
    match self.current.read().await.as_ref() {
      Some(key) if key.challenge_id == challenge.id => Ok(key.clone()),
      _ => Err(EngineError::NoActiveSession),
    }
  }

  // ---- Submissions ----

  /// Runs, grades and records `code` against the current session.
  pub async fn submit_code(&self, code: &str, challenge: &Challenge) -> Result<CodeSubmission, EngineError> {
    let key = self.current_key_for(challenge).await?;
    self.submit_with_key(key, code, challenge).await
  }

  pub async fn submit_code_for(&self, user_id: &str, code: &str, challenge: &Challenge) -> Result<CodeSubmission, EngineError> {
    self.submit_with_key(SessionKey::new(user_id, challenge.id.clone()), code, challenge).await
  }

  #[instrument(level = "info", skip(self, code, challenge), fields(user_id = %key.user_id, id = %challenge.id, code_len = code.len()))]
  async fn submit_with_key(&self, key: SessionKey, code: &str, challenge: &Challenge) -> Result<CodeSubmission, EngineError> {
    if !self.runtime.is_ready() {
      return Err(EngineError::RuntimeNotReady);
    }
    let session_id = self.sessions.get(&key).await.ok_or(EngineError::NoActiveSession)?.id;

    let eval = self.evaluate(code, challenge).await?;
    let submission = CodeSubmission {
      id: Uuid::new_v4().to_string(),
      code: code.to_string(),
      submitted_at: Utc::now(),
      validation_result: eval.result,
      output: eval.raw_output,
    };

    let attempts = self
      .sessions
      .update(&key, |s| {
        // A session restarted while this run was in flight must not inherit it.
        (s.id == session_id).then(|| {
          s.record(&submission, eval.output);
          s.attempts
        })
      })
      .await
      .flatten()
      .ok_or(EngineError::NoActiveSession)?;

    info!(
      target: "challenge",
      id = %challenge.id,
      submission_id = %submission.id,
      attempts,
      score = submission.validation_result.score,
      valid = submission.validation_result.is_valid,
      "Submission recorded"
    );
    Ok(submission)
  }

  // ---- Hints ----

  /// Unlocks the next locked hint of the current session. `Ok(None)` when all are unlocked.
  pub async fn request_hint(&self, challenge: &Challenge) -> Result<Option<Hint>, EngineError> {
    let key = self.current_key_for(challenge).await?;
    self.unlock_next_hint(&key, challenge).await
  }

  pub async fn request_hint_for(&self, user_id: &str, challenge: &Challenge) -> Result<Option<Hint>, EngineError> {
    self.unlock_next_hint(&SessionKey::new(user_id, challenge.id.clone()), challenge).await
  }

  async fn unlock_next_hint(&self, key: &SessionKey, challenge: &Challenge) -> Result<Option<Hint>, EngineError> {
    let hint = self
      .sessions
      .update(key, |s| {
        let next = challenge
          .hints
          .iter()
          .find(|h| !s.hints_unlocked.contains(&h.id))
          .cloned();
        if let Some(h) = &next {
          s.unlock_hint(&h.id);
        }
        next
      })
      .await
      .ok_or(EngineError::NoActiveSession)?;
    match &hint {
      Some(h) => info!(target: "challenge", id = %challenge.id, hint_id = %h.id, "Hint unlocked"),
      None => info!(target: "challenge", id = %challenge.id, "No hints left"),
    }
    Ok(hint)
  }

  // ---- XP ----

  pub fn calculate_xp(&self, challenge: &Challenge, submission: &CodeSubmission, session: &ChallengeSession) -> u32 {
    scoring::calculate_xp(challenge, submission, session)
  }

  pub fn xp_breakdown(&self, challenge: &Challenge, submission: &CodeSubmission, session: &ChallengeSession) -> XpBreakdown {
    scoring::xp_breakdown(challenge, submission, session)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hello() -> Challenge {
    Challenge::new("hello", "Hello", 5, 50)
      .with_concepts(["Output"])
      .with_hint("h1", "Use print()")
      .with_hint("h2", "Put the text in quotes")
  }

  #[tokio::test]
  async fn hints_unlock_in_order() {
    let engine = ChallengeEngine::new(SandboxConfig::default());
    let ch = hello();
    assert_eq!(engine.request_hint(&ch).await, Err(EngineError::NoActiveSession));

    engine.start_challenge_session("hello", "u1").await;
    assert_eq!(engine.request_hint(&ch).await.unwrap().unwrap().id, "h1");
    assert_eq!(engine.request_hint(&ch).await.unwrap().unwrap().id, "h2");
    assert_eq!(engine.request_hint(&ch).await.unwrap(), None);
    assert_eq!(engine.get_current_session().await.unwrap().hints_unlocked, vec!["h1", "h2"]);
  }

  #[tokio::test]
  async fn submit_before_ready_does_not_count() {
    let engine = ChallengeEngine::new(SandboxConfig::default());
    engine.start_challenge_session("hello", "u1").await;
    let err = engine.submit_code("print('hi')", &hello()).await.unwrap_err();
    assert_eq!(err, EngineError::RuntimeNotReady);
    assert_eq!(engine.get_current_session().await.unwrap().attempts, 0);
  }

  #[tokio::test]
  async fn submit_for_other_challenge_has_no_session() {
    let engine = ChallengeEngine::new(SandboxConfig::default());
    engine.ensure_ready().await.unwrap();
    engine.start_challenge_session("other", "u1").await;
    let err = engine.submit_code("print('hi')", &hello()).await.unwrap_err();
    assert_eq!(err, EngineError::NoActiveSession);
  }

  #[tokio::test]
  async fn syntax_errors_skip_execution() {
    let engine = ChallengeEngine::new(SandboxConfig::default());
    engine.ensure_ready().await.unwrap();
    let report = engine.execute_code("print('a'", &hello()).await;
    assert_eq!(report.validation_result.score, 0);
    assert_eq!(report.execution_time_ms, 0);
    assert!(report.output[0].starts_with("Error: Syntax error on line"));
  }

  #[tokio::test]
  async fn restarted_session_does_not_inherit_in_flight_submission() {
    let config = SandboxConfig { max_operations: usize::MAX, max_duration_ms: 400, ..SandboxConfig::default() };
    let engine = ChallengeEngine::new(config);
    engine.ensure_ready().await.unwrap();
    let first = engine.start_challenge_session("hello", "u1").await;

    let challenge = hello();
    let (submitted, restarted) = tokio::join!(engine.submit_code("while True:\n    pass\n", &challenge), async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      engine.start_challenge_session("hello", "u1").await
    });

    assert_eq!(submitted.unwrap_err(), EngineError::NoActiveSession);
    assert_ne!(restarted.id, first.id);
    let current = engine.get_current_session().await.unwrap();
    assert_eq!(current.id, restarted.id);
    assert_eq!(current.attempts, 0);
    assert!(current.last_validation.is_none());
  }

  #[tokio::test]
  async fn end_session_for_clears_current() {
    let engine = ChallengeEngine::new(SandboxConfig::default());
    engine.start_challenge_session("hello", "u1").await;
    assert!(engine.end_session_for("u1", "hello").await.is_some());
    assert!(engine.get_current_session().await.is_none());
    assert!(engine.end_session_for("u1", "hello").await.is_none());
  }
}
