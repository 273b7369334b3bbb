//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

/// Engine errors rendered as `{ "code": ..., "error": ... }` with a matching status.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
  fn from(err: EngineError) -> Self { ApiError(err) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      EngineError::RuntimeNotReady => StatusCode::SERVICE_UNAVAILABLE,
      EngineError::NoActiveSession => StatusCode::CONFLICT,
      EngineError::UnknownChallenge(_) => StatusCode::NOT_FOUND,
      EngineError::Runtime(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    warn!(target: "caatuu_engine", %status, error = %self.0, "Request failed");
    let body = Json(serde_json::json!({ "code": self.0.code(), "error": self.0.to_string() }));
    (status, body).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::engine_status(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_challenges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let out: Vec<ChallengeOut> = state.list_challenges().await.iter().map(to_out).collect();
  Json(out)
}

#[instrument(level = "info", skip(state), fields(id = %q.id))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ChallengeQuery>,
) -> Result<Json<ChallengeOut>, ApiError> {
  let ch = state
    .get_challenge(&q.id)
    .await
    .ok_or_else(|| EngineError::UnknownChallenge(q.id.clone()))?;
  info!(target: "challenge", id = %ch.id, "HTTP challenge served");
  Ok(Json(to_out(&ch)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.challenge_id))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Result<impl IntoResponse, ApiError> {
  let session = logic::start_session(&state, &body.user_id, &body.challenge_id).await?;
  Ok(Json(session))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.challenge_id, code_len = body.code.len()))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Result<impl IntoResponse, ApiError> {
  let out = logic::submit(&state, &body.user_id, &body.challenge_id, &body.code).await?;
  info!(target: "challenge", id = %body.challenge_id, score = out.submission.validation_result.score, xp = out.xp.total, "HTTP submit evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%body.challenge_id, code_len = body.code.len()))]
pub async fn http_post_execute(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CodeIn>,
) -> Result<impl IntoResponse, ApiError> {
  let report = logic::execute(&state, &body.challenge_id, &body.code).await?;
  Ok(Json(report))
}

#[instrument(level = "debug", skip(state, body), fields(%body.challenge_id, code_len = body.code.len()))]
pub async fn http_post_realtime(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CodeIn>,
) -> Result<impl IntoResponse, ApiError> {
  let errors = logic::realtime(&state, &body.challenge_id, &body.code).await?;
  Ok(Json(RealtimeOut { errors }))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.challenge_id))]
pub async fn http_post_hint(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Result<impl IntoResponse, ApiError> {
  let out = logic::hint(&state, &body.user_id, &body.challenge_id).await?;
  info!(target: "challenge", id = %body.challenge_id, remaining = out.remaining, "HTTP hint served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.challenge_id))]
pub async fn http_post_end_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> impl IntoResponse {
  let ended = logic::end_session(&state, &body.user_id, &body.challenge_id).await;
  Json(EndSessionOut { ended })
}
