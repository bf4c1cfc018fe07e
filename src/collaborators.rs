//! Seams to the services the engine consumes but does not implement.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ChallengeId, ChallengeTicket, HintReply, Node, PathId, TutorVerdict};
use crate::error::EngineError;
use crate::graph::GraphModel;

/// Source of path graphs. Each fetch returns a complete, immutable snapshot.
#[async_trait]
pub trait PathSource: Send + Sync {
  /// `PathNotFound` for unknown ids.
  async fn fetch_graph(&self, path_id: PathId) -> Result<Arc<GraphModel>, EngineError>;
}

/// The tutor: challenge authoring, grading and hints.
#[async_trait]
pub trait Tutor: Send + Sync {
  /// Idempotent per node until the challenge is passed.
  async fn create_or_fetch_challenge(&self, graph: &GraphModel, node: &Node) -> Result<ChallengeTicket, EngineError>;

  async fn score(&self, challenge_id: ChallengeId, answer: &str) -> Result<TutorVerdict, EngineError>;

  async fn generate_hint(&self, challenge_id: ChallengeId, hint_level: u32) -> Result<HintReply, EngineError>;

  /// Called once a verdict passed the node, so the next create-or-fetch for it
  /// hands out a fresh challenge.
  async fn mark_passed(&self, challenge_id: ChallengeId) -> Result<(), EngineError>;

  /// The path was deleted or replaced wholesale; challenges authored for its
  /// old nodes must not be handed out again.
  async fn forget_path(&self, path_id: PathId);
}
