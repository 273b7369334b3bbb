//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Each function resolves the challenge by id, forwards to the engine, and
//! shapes the result into a protocol DTO.

use tracing::{debug, error, info, instrument};

use crate::domain::{Challenge, ChallengeSession, EngineStatus, ExecutionReport, ValidationError};
use crate::error::EngineError;
use crate::protocol::{HintOut, SubmitOut};
use crate::state::AppState;

async fn challenge(state: &AppState, challenge_id: &str) -> Result<Challenge, EngineError> {
  state
    .get_challenge(challenge_id)
    .await
    .ok_or_else(|| EngineError::UnknownChallenge(challenge_id.to_string()))
}

pub fn engine_status(state: &AppState) -> EngineStatus {
  state.engine.get_engine_status()
}

/// Starts loading the sandbox without waiting for it. No-op while a load is in flight.
pub fn warm_up(state: &AppState) {
  let status = state.engine.get_engine_status();
  if status.ready || status.initializing {
    return;
  }
  let engine = state.engine.clone();
  tokio::spawn(async move {
    if let Err(e) = engine.ensure_ready().await {
      error!(target: "caatuu_engine", error = %e, "Sandbox warm-up failed; will retry on demand");
    }
  });
}

#[instrument(level = "info", skip(state), fields(%user_id, %challenge_id))]
pub async fn start_session(state: &AppState, user_id: &str, challenge_id: &str) -> Result<ChallengeSession, EngineError> {
  let ch = challenge(state, challenge_id).await?;
  Ok(state.engine.start_challenge_session(&ch.id, user_id).await)
}

#[instrument(level = "info", skip(state, code), fields(%user_id, %challenge_id, code_len = code.len()))]
pub async fn submit(state: &AppState, user_id: &str, challenge_id: &str, code: &str) -> Result<SubmitOut, EngineError> {
  let ch = challenge(state, challenge_id).await?;
  let submission = match state.engine.submit_code_for(user_id, code, &ch).await {
    Ok(s) => s,
    Err(e) => {
      if e == EngineError::RuntimeNotReady {
        warm_up(state);
      }
      return Err(e);
    }
  };
  let session = state
    .engine
    .session_for(user_id, challenge_id)
    .await
    .ok_or(EngineError::NoActiveSession)?;
  let xp = state.engine.xp_breakdown(&ch, &submission, &session);
  info!(target: "challenge", id = %ch.id, %user_id, score = submission.validation_result.score, xp = xp.total, "Submission graded");
  Ok(SubmitOut { submission, session, xp })
}

#[instrument(level = "info", skip(state, code), fields(%challenge_id, code_len = code.len()))]
pub async fn execute(state: &AppState, challenge_id: &str, code: &str) -> Result<ExecutionReport, EngineError> {
  let ch = challenge(state, challenge_id).await?;
  let report = state.engine.execute_code(code, &ch).await;
  if !state.engine.is_engine_ready() {
    warm_up(state);
  }
  Ok(report)
}

#[instrument(level = "debug", skip(state, code), fields(%challenge_id, code_len = code.len()))]
pub async fn realtime(state: &AppState, challenge_id: &str, code: &str) -> Result<Vec<ValidationError>, EngineError> {
  let ch = challenge(state, challenge_id).await?;
  let errors = state.engine.validate_realtime(code, &ch);
  debug!(target: "challenge", id = %ch.id, issues = errors.len(), "Realtime check");
  Ok(errors)
}

#[instrument(level = "info", skip(state), fields(%user_id, %challenge_id))]
pub async fn hint(state: &AppState, user_id: &str, challenge_id: &str) -> Result<HintOut, EngineError> {
  let ch = challenge(state, challenge_id).await?;
  let hint = state.engine.request_hint_for(user_id, &ch).await?;
  let unlocked = state
    .engine
    .session_for(user_id, challenge_id)
    .await
    .map(|s| s.hints_unlocked.len())
    .unwrap_or_default();
  Ok(HintOut { hint, remaining: ch.hints.len().saturating_sub(unlocked) })
}

#[instrument(level = "info", skip(state), fields(%user_id, %challenge_id))]
pub async fn end_session(state: &AppState, user_id: &str, challenge_id: &str) -> bool {
  state.engine.end_session_for(user_id, challenge_id).await.is_some()
}
