//! Engine error taxonomy with HTTP status mapping.
//!
//! Every operation returns `Result<_, EngineError>`. None of the variants imply a
//! partial write: progress updates are all-or-nothing and a failed submission
//! leaves its session `Active`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{ChallengeId, NodeId, PathId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("path {0} not found")]
  PathNotFound(PathId),

  #[error("node {node_id} not found in path {path_id}")]
  NodeNotFound { path_id: PathId, node_id: NodeId },

  #[error("challenge {0} not found")]
  ChallengeNotFound(ChallengeId),

  /// The node still has incomplete prerequisites.
  #[error("node {node_id} is locked until its prerequisites are completed")]
  Locked { node_id: NodeId },

  #[error("hint level {got} requested, expected {expected}")]
  InvalidHintLevel { expected: u32, got: u32 },

  #[error("challenge {0} already has a submission in flight")]
  AlreadySubmitting(ChallengeId),

  /// A collaborator (catalog, tutor) failed; propagated without retries.
  #[error("upstream unavailable: {0}")]
  UpstreamUnavailable(String),

  #[error("answer must not be empty")]
  EmptyAnswer,

  #[error("invalid session state: {0}")]
  InvalidState(String),

  #[error("invalid graph: {0}")]
  InvalidGraph(String),
}

impl EngineError {
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::PathNotFound(_) | EngineError::NodeNotFound { .. } | EngineError::ChallengeNotFound(_) => "NOT_FOUND",
      EngineError::Locked { .. } => "LOCKED",
      EngineError::InvalidHintLevel { .. } => "INVALID_HINT_LEVEL",
      EngineError::AlreadySubmitting(_) => "ALREADY_SUBMITTING",
      EngineError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
      EngineError::EmptyAnswer => "EMPTY_ANSWER",
      EngineError::InvalidState(_) => "INVALID_STATE",
      EngineError::InvalidGraph(_) => "INVALID_GRAPH",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      EngineError::PathNotFound(_) | EngineError::NodeNotFound { .. } | EngineError::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
      EngineError::Locked { .. } => StatusCode::LOCKED,
      EngineError::InvalidHintLevel { .. } => StatusCode::CONFLICT,
      EngineError::AlreadySubmitting(_) => StatusCode::CONFLICT,
      EngineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
      EngineError::EmptyAnswer => StatusCode::BAD_REQUEST,
      EngineError::InvalidState(_) => StatusCode::CONFLICT,
      EngineError::InvalidGraph(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
  pub code: &'static str,
  pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
  error: ErrorDetail,
}

impl IntoResponse for EngineError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = ErrorBody { error: ErrorDetail { code: self.code(), message: self.to_string() } };
    (status, Json(body)).into_response()
  }
}
