//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::EngineError;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "caatuu_engine", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "caatuu_engine", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "caatuu_engine", kind = message_kind(&incoming), "WS received");
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { code: "invalid_json".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "serialization", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "caatuu_engine", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "caatuu_engine", "WebSocket disconnected");
}

fn message_kind(msg: &ClientWsMessage) -> &'static str {
  match msg {
    ClientWsMessage::Ping => "ping",
    ClientWsMessage::Status => "status",
    ClientWsMessage::StartSession { .. } => "start_session",
    ClientWsMessage::Submit { .. } => "submit",
    ClientWsMessage::Execute { .. } => "execute",
    ClientWsMessage::Realtime { .. } => "realtime",
    ClientWsMessage::Hint { .. } => "hint",
    ClientWsMessage::EndSession { .. } => "end_session",
  }
}

fn error_msg(err: EngineError) -> ServerWsMessage {
  ServerWsMessage::Error { code: err.code().into(), message: err.to_string() }
}

/// Dispatches one parsed client message. Code bodies are never logged.
#[instrument(level = "info", skip(msg, state), fields(kind = message_kind(&msg)))]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Status => ServerWsMessage::Status { status: logic::engine_status(state) },

    ClientWsMessage::StartSession { user_id, challenge_id } => {
      match logic::start_session(state, &user_id, &challenge_id).await {
        Ok(session) => ServerWsMessage::Session { session },
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::Submit { user_id, challenge_id, code } => {
      match logic::submit(state, &user_id, &challenge_id, &code).await {
        Ok(out) => {
          info!(target: "challenge", id = %challenge_id, score = out.submission.validation_result.score, xp = out.xp.total, "WS submit evaluated");
          ServerWsMessage::SubmitResult { submission: out.submission, session: out.session, xp: out.xp }
        }
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::Execute { challenge_id, code } => {
      match logic::execute(state, &challenge_id, &code).await {
        Ok(report) => ServerWsMessage::ExecutionResult { report },
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::Realtime { challenge_id, code } => {
      match logic::realtime(state, &challenge_id, &code).await {
        Ok(errors) => ServerWsMessage::Realtime { errors },
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::Hint { user_id, challenge_id } => {
      match logic::hint(state, &user_id, &challenge_id).await {
        Ok(out) => {
          info!(target: "challenge", id = %challenge_id, remaining = out.remaining, "WS hint served");
          ServerWsMessage::Hint { hint: out.hint, remaining: out.remaining }
        }
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::EndSession { user_id, challenge_id } => {
      let ended = logic::end_session(state, &user_id, &challenge_id).await;
      ServerWsMessage::SessionEnded { ended }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;

  #[tokio::test]
  async fn ws_flow_without_socket() {
    let state = AppState::from_config(EngineConfig::default());
    let parse = |s: &str| serde_json::from_str::<ClientWsMessage>(s).unwrap();

    let reply = handle_client_ws(parse(r#"{"type":"ping"}"#), &state).await;
    assert!(matches!(reply, ServerWsMessage::Pong));

    let reply = handle_client_ws(parse(r#"{"type":"start_session","userId":"u1","challengeId":"nope"}"#), &state).await;
    match reply {
      ServerWsMessage::Error { code, .. } => assert_eq!(code, "unknown_challenge"),
      other => panic!("unexpected {other:?}"),
    }

    let reply = handle_client_ws(parse(r#"{"type":"start_session","userId":"u1","challengeId":"hello-world"}"#), &state).await;
    assert!(matches!(reply, ServerWsMessage::Session { .. }));

    let reply = handle_client_ws(parse(r#"{"type":"hint","userId":"u1","challengeId":"hello-world"}"#), &state).await;
    match reply {
      ServerWsMessage::Hint { hint, remaining } => {
        assert_eq!(hint.map(|h| h.id).as_deref(), Some("hello-1"));
        assert_eq!(remaining, 1);
      }
      other => panic!("unexpected {other:?}"),
    }

    let reply = handle_client_ws(
      parse(r#"{"type":"submit","userId":"u1","challengeId":"hello-world","code":"print('Hello, World!')"}"#),
      &state,
    )
    .await;
    match reply {
      ServerWsMessage::Error { code, .. } => assert_eq!(code, "runtime_not_ready"),
      other => panic!("unexpected {other:?}"),
    }

    state.engine.ensure_ready().await.unwrap();
    let reply = handle_client_ws(
      parse(r#"{"type":"submit","userId":"u1","challengeId":"hello-world","code":"print('Hello, World!')"}"#),
      &state,
    )
    .await;
    match reply {
      ServerWsMessage::SubmitResult { submission, session, xp } => {
        assert!(submission.validation_result.is_valid);
        assert_eq!(session.attempts, 1);
        // Hint used: no no-hints bonus.
        assert_eq!(xp.no_hints_bonus, 0);
        assert_eq!(xp.first_attempt_bonus, 10);
      }
      other => panic!("unexpected {other:?}"),
    }
  }
}
