//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the engine. We reply with a single JSON message per request.
//!
//! A connection holds at most one challenge session in its own memory. Opening
//! another node replaces it; disconnecting abandons it. The learner is fixed at
//! upgrade time from the same header or query parameter HTTP uses.

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::adaptation::NodeCountToken;
use crate::domain::LearnerId;
use crate::error::EngineError;
use crate::protocol::{to_out, ClientWsMessage, ServerWsMessage};
use crate::routes::http::Learner;
use crate::session::ChallengeSession;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>, Learner(learner): Learner) -> impl IntoResponse {
  info!(target: "skillpath_backend", %learner, "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, learner))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: AppState, learner: LearnerId) {
  info!(target: "skillpath_backend", "WebSocket connected");
  let mut session: Option<ChallengeSession> = None;

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "skillpath_backend", "WS received: {:?}", &incoming);
            match handle_client_ws(incoming, &state, &learner, &mut session).await {
              Ok(reply) => reply,
              Err(e) => ServerWsMessage::Error { code: e.code().into(), message: e.to_string() },
            }
          }
          Err(e) => ServerWsMessage::Error { code: "BAD_REQUEST".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "INTERNAL", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "skillpath_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  if let Some(s) = session {
    info!(target: "challenge", challenge_id = s.challenge_id(), "Session abandoned on disconnect");
  }
  info!(target: "skillpath_backend", "WebSocket disconnected");
}

fn current(session: &mut Option<ChallengeSession>) -> Result<&mut ChallengeSession, EngineError> {
  session.as_mut().ok_or_else(|| EngineError::InvalidState("no open challenge on this connection".into()))
}

#[instrument(level = "info", skip(state, session))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  learner: &str,
  session: &mut Option<ChallengeSession>,
) -> Result<ServerWsMessage, EngineError> {
  let reply = match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Status { path_id, node_id } => {
      let status = state.engine.effective_status(learner, path_id, node_id).await?;
      ServerWsMessage::Status { node_id, status }
    }

    ClientWsMessage::OpenChallenge { path_id, node_id } => {
      let opened = state.engine.open_challenge(learner, path_id, node_id).await?;
      info!(target: "challenge", %path_id, %node_id, challenge_id = opened.challenge_id(), "WS challenge served");
      let out = to_out(&opened);
      *session = Some(opened);
      ServerWsMessage::Session { session: out }
    }

    ClientWsMessage::Hint { hint_level } => {
      let s = current(session)?;
      let text = state.engine.request_hint(s, hint_level).await?;
      ServerWsMessage::Hint { text, hint_level: s.hint_level(), exhausted: s.hints_exhausted() }
    }

    ClientWsMessage::Submit { answer } => {
      let s = current(session)?;
      let outcome = state.engine.submit(s, &answer).await?;
      info!(target: "challenge", challenge_id = s.challenge_id(), passed = outcome.verdict.pass_node, "WS submit evaluated");
      ServerWsMessage::Evaluated { result: outcome.into(), session: to_out(s) }
    }

    ClientWsMessage::Retry => {
      let s = current(session)?;
      state.engine.retry(s)?;
      ServerWsMessage::Session { session: to_out(s) }
    }

    ClientWsMessage::Abandon => {
      *session = None;
      ServerWsMessage::Abandoned
    }

    ClientWsMessage::CheckExpansion { path_id, node_count_before } => {
      let report = state.engine.detect_expansion(NodeCountToken { path_id, node_count: node_count_before }).await?;
      ServerWsMessage::Expansion { report }
    }
  };
  Ok(reply)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::catalog::InMemoryCatalog;
  use crate::config::TutorSettings;
  use crate::domain::EffectiveNodeStatus;
  use crate::seeds::seed_paths;
  use crate::session::SessionState;
  use crate::tutor::TutorService;

  const THOROUGH: &str = "Ownership means every value has exactly one owner, and when that owner goes out of scope the value is dropped automatically.";

  async fn state() -> AppState {
    let catalog = InMemoryCatalog::new();
    for p in seed_paths() {
      catalog.load(p).await.unwrap();
    }
    AppState::with_collaborators(catalog, Arc::new(TutorService::local(TutorSettings::default())))
  }

  async fn send(state: &AppState, session: &mut Option<ChallengeSession>, msg: ClientWsMessage) -> ServerWsMessage {
    handle_client_ws(msg, state, "ana", session).await.unwrap()
  }

  #[tokio::test]
  async fn hint_without_an_open_challenge_is_a_state_error() {
    let state = state().await;
    let mut session = None;
    let err = handle_client_ws(ClientWsMessage::Hint { hint_level: 0 }, &state, "ana", &mut session).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(err.code(), "INVALID_STATE");

    let err = handle_client_ws(ClientWsMessage::Submit { answer: THOROUGH.into() }, &state, "ana", &mut session)
      .await
      .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
  }

  #[tokio::test]
  async fn open_hint_fail_retry_pass_over_one_connection() {
    let state = state().await;
    let mut session = None;

    let opened = match send(&state, &mut session, ClientWsMessage::OpenChallenge { path_id: 1, node_id: 1 }).await {
      ServerWsMessage::Session { session } => session,
      other => panic!("expected session, got {other:?}"),
    };
    assert_eq!(opened.learner_id, "ana");
    assert_eq!(opened.node_count_before, 5);
    let challenge_id = opened.challenge_id;

    match send(&state, &mut session, ClientWsMessage::Hint { hint_level: 0 }).await {
      ServerWsMessage::Hint { text, hint_level, .. } => {
        assert!(text.contains("Ownership"));
        assert_eq!(hint_level, 1);
      }
      other => panic!("expected hint, got {other:?}"),
    }

    match send(&state, &mut session, ClientWsMessage::Submit { answer: "no idea".into() }).await {
      ServerWsMessage::Evaluated { result, session } => {
        assert!(!result.pass_node);
        assert!(session.retry_allowed);
        assert_eq!(session.state, SessionState::Evaluated { passed: false });
      }
      other => panic!("expected evaluation, got {other:?}"),
    }

    match send(&state, &mut session, ClientWsMessage::Retry).await {
      ServerWsMessage::Session { session } => {
        assert_eq!(session.challenge_id, challenge_id);
        assert_eq!(session.state, SessionState::Active);
      }
      other => panic!("expected session, got {other:?}"),
    }

    match send(&state, &mut session, ClientWsMessage::Submit { answer: THOROUGH.into() }).await {
      ServerWsMessage::Evaluated { result, session } => {
        assert!(result.pass_node);
        assert_eq!(result.unlocked, vec![2]);
        assert_eq!(result.progress.attempts_count, 2);
        assert_eq!(session.state, SessionState::Evaluated { passed: true });
      }
      other => panic!("expected evaluation, got {other:?}"),
    }

    match send(&state, &mut session, ClientWsMessage::Status { path_id: 1, node_id: 2 }).await {
      ServerWsMessage::Status { status, .. } => assert_eq!(status, EffectiveNodeStatus::NotStarted),
      other => panic!("expected status, got {other:?}"),
    }

    match send(&state, &mut session, ClientWsMessage::CheckExpansion { path_id: 1, node_count_before: 5 }).await {
      ServerWsMessage::Expansion { report } => assert!(!report.expanded),
      other => panic!("expected expansion report, got {other:?}"),
    }

    assert!(matches!(send(&state, &mut session, ClientWsMessage::Abandon).await, ServerWsMessage::Abandoned));
    assert!(session.is_none());
  }

  #[tokio::test]
  async fn connections_see_their_own_learners_progress() {
    let state = state().await;
    let mut ana = None;
    send(&state, &mut ana, ClientWsMessage::OpenChallenge { path_id: 1, node_id: 1 }).await;
    send(&state, &mut ana, ClientWsMessage::Submit { answer: THOROUGH.into() }).await;

    let mut bo = None;
    let status = handle_client_ws(ClientWsMessage::Status { path_id: 1, node_id: 2 }, &state, "bo", &mut bo).await.unwrap();
    assert!(matches!(status, ServerWsMessage::Status { status: EffectiveNodeStatus::Blocked, .. }));
  }
}
