//! HTTP endpoint handlers. These are thin wrappers that forward to the engine.
//! Each handler is instrumented and logs parameters and basic result info.
//!
//! Progress and sessions belong to a learner, named by the `x-learner-id`
//! header or the `learner` query parameter.

use std::convert::Infallible;

use axum::{
  async_trait,
  extract::{FromRequestParts, Path, Query, State},
  http::request::Parts,
  Json,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::adaptation::{check_path_expansion, ExpansionReport, NodeCountToken};
use crate::catalog::PathSummary;
use crate::domain::{AttemptRecord, ChallengeId, LearnerId, NodeId, PathId, PathProgress, DEFAULT_LEARNER};
use crate::engine::PathStatusView;
use crate::error::EngineError;
use crate::graph::GraphModel;
use crate::protocol::*;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, EngineError>;

pub const LEARNER_HEADER: &str = "x-learner-id";

/// Who is asking. Falls back to the default learner when neither the header nor
/// the query parameter names one.
#[derive(Debug, Clone)]
pub struct Learner(pub LearnerId);

#[derive(Deserialize)]
struct LearnerQuery {
  learner: Option<String>,
}

fn non_blank(v: &str) -> Option<String> {
  let v = v.trim();
  (!v.is_empty()).then(|| v.to_string())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Learner {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let from_header = parts.headers.get(LEARNER_HEADER).and_then(|v| v.to_str().ok()).and_then(non_blank);
    let learner = from_header
      .or_else(|| {
        Query::<LearnerQuery>::try_from_uri(&parts.uri).ok().and_then(|Query(q)| q.learner).and_then(|l| non_blank(&l))
      })
      .unwrap_or_else(|| DEFAULT_LEARNER.to_string());
    Ok(Learner(learner))
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> Json<HealthOut> { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_paths(State(state): State<AppState>) -> Json<Vec<PathSummary>> {
  Json(state.catalog.list().await)
}

#[instrument(level = "info", skip(state, body), fields(%path_id, nodes = body.nodes.len(), edges = body.edges.len()))]
pub async fn http_put_path(
  State(state): State<AppState>,
  Path(path_id): Path<PathId>,
  Learner(learner): Learner,
  Json(body): Json<PathIn>,
) -> ApiResult<PathStatusView> {
  let graph = GraphModel::new(path_id, body.goal_title, body.nodes, body.edges)?;
  if !graph.dangling_edges().is_empty() {
    warn!(target: "catalog", %path_id, dangling = graph.dangling_edges().len(), "Stored path has edges to unknown nodes");
  }
  state.catalog.put(graph).await;
  state.engine.retire_challenges(path_id).await;
  let dropped = state.drop_path_sessions(path_id).await;
  info!(target: "catalog", %path_id, dropped_sessions = dropped, "Path stored");
  Ok(Json(state.engine.statuses(&learner, path_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_path(
  State(state): State<AppState>,
  Path(path_id): Path<PathId>,
  Learner(learner): Learner,
) -> ApiResult<PathStatusView> {
  Ok(Json(state.engine.statuses(&learner, path_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_path(State(state): State<AppState>, Path(path_id): Path<PathId>) -> ApiResult<DeletedOut> {
  if !state.catalog.remove(path_id).await {
    return Err(EngineError::PathNotFound(path_id));
  }
  state.engine.forget_path(path_id).await;
  let dropped = state.drop_path_sessions(path_id).await;
  info!(target: "catalog", %path_id, dropped_sessions = dropped, "Path deleted");
  Ok(Json(DeletedOut { deleted: path_id }))
}

#[instrument(level = "info", skip(state, body), fields(%path_id, prereqs = ?body.prereqs, unlocks = ?body.unlocks))]
pub async fn http_insert_node(
  State(state): State<AppState>,
  Path(path_id): Path<PathId>,
  Json(body): Json<InsertNodeIn>,
) -> ApiResult<InsertNodeOut> {
  let (node, graph) = state.catalog.insert_node(path_id, body.node, &body.prereqs, &body.unlocks).await?;
  Ok(Json(InsertNodeOut { node, node_count: graph.node_count() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_progress(
  State(state): State<AppState>,
  Path(path_id): Path<PathId>,
  Learner(learner): Learner,
) -> ApiResult<PathProgress> {
  Ok(Json(state.engine.path_progress(&learner, path_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_status(
  State(state): State<AppState>,
  Path((path_id, node_id)): Path<(PathId, NodeId)>,
  Learner(learner): Learner,
) -> ApiResult<StatusOut> {
  let status = state.engine.effective_status(&learner, path_id, node_id).await?;
  Ok(Json(StatusOut { path_id, node_id, status }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_open_challenge(
  State(state): State<AppState>,
  Path((path_id, node_id)): Path<(PathId, NodeId)>,
  Learner(learner): Learner,
) -> ApiResult<SessionOut> {
  let opened = state.engine.open_challenge(&learner, path_id, node_id).await?;
  let shared = state.register_session(opened).await;
  let session = shared.lock().await;
  info!(target: "challenge", %learner, %path_id, %node_id, challenge_id = session.challenge_id(), "HTTP challenge served");
  Ok(Json(to_out(&session)))
}

#[instrument(level = "info", skip(state, body), fields(%path_id, before = body.node_count_before))]
pub async fn http_post_expansion(
  State(state): State<AppState>,
  Path(path_id): Path<PathId>,
  Json(body): Json<ExpansionIn>,
) -> ApiResult<ExpansionReport> {
  let token = NodeCountToken { path_id, node_count: body.node_count_before };
  Ok(Json(state.engine.detect_expansion(token).await?))
}

#[instrument(level = "info")]
pub async fn http_compare_expansion(Query(q): Query<ExpansionQuery>) -> Json<ExpansionOut> {
  Json(ExpansionOut { expanded: check_path_expansion(q.before, q.after) })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<AppState>,
  Path(challenge_id): Path<ChallengeId>,
  Learner(learner): Learner,
) -> ApiResult<SessionOut> {
  let shared = state.session(&learner, challenge_id).await?;
  let session = shared.lock().await;
  Ok(Json(to_out(&session)))
}

#[instrument(level = "info", skip(state, body), fields(%challenge_id, hint_level = body.hint_level))]
pub async fn http_post_hint(
  State(state): State<AppState>,
  Path(challenge_id): Path<ChallengeId>,
  Learner(learner): Learner,
  Json(body): Json<HintIn>,
) -> ApiResult<HintOut> {
  let shared = state.session(&learner, challenge_id).await?;
  let mut session = shared.lock().await;
  let hint = state.engine.request_hint(&mut session, body.hint_level).await?;
  info!(target: "challenge", %learner, %challenge_id, level = body.hint_level, "HTTP hint served");
  Ok(Json(HintOut { hint, hint_level: session.hint_level(), exhausted: session.hints_exhausted() }))
}

#[instrument(level = "info", skip(state, body), fields(%challenge_id, answer_len = body.answer.len()))]
pub async fn http_post_submit(
  State(state): State<AppState>,
  Path(challenge_id): Path<ChallengeId>,
  Learner(learner): Learner,
  Json(body): Json<SubmitIn>,
) -> ApiResult<SubmitOut> {
  let shared = state.session(&learner, challenge_id).await?;
  let mut session = shared.lock().await;
  let outcome = state.engine.submit(&mut session, &body.answer).await?;
  info!(target: "challenge", %learner, %challenge_id, passed = outcome.verdict.pass_node, "HTTP submit evaluated");
  Ok(Json(outcome.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_retry(
  State(state): State<AppState>,
  Path(challenge_id): Path<ChallengeId>,
  Learner(learner): Learner,
) -> ApiResult<SessionOut> {
  let shared = state.session(&learner, challenge_id).await?;
  let mut session = shared.lock().await;
  state.engine.retry(&mut session)?;
  Ok(Json(to_out(&session)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<AppState>,
  Path(challenge_id): Path<ChallengeId>,
  Learner(learner): Learner,
) -> ApiResult<DeletedOut> {
  if !state.drop_session(&learner, challenge_id).await {
    return Err(EngineError::ChallengeNotFound(challenge_id));
  }
  Ok(Json(DeletedOut { deleted: challenge_id }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_attempts(
  State(state): State<AppState>,
  Path(challenge_id): Path<ChallengeId>,
  Learner(learner): Learner,
) -> ApiResult<Vec<AttemptRecord>> {
  state.session(&learner, challenge_id).await?;
  Ok(Json(state.engine.attempts_for(&learner, challenge_id).await))
}
