//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::adaptation::ExpansionReport;
use crate::catalog::NodeDraft;
use crate::domain::{ChallengeId, EffectiveNodeStatus, Edge, LearnerId, Node, NodeId, NodeProgress, PathId, TutorVerdict};
use crate::engine::SubmitOutcome;
use crate::session::{ChallengeSession, SessionState};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  Status {
    #[serde(rename = "pathId")]
    path_id: PathId,
    #[serde(rename = "nodeId")]
    node_id: NodeId,
  },
  OpenChallenge {
    #[serde(rename = "pathId")]
    path_id: PathId,
    #[serde(rename = "nodeId")]
    node_id: NodeId,
  },
  Hint {
    #[serde(rename = "hintLevel")]
    hint_level: u32,
  },
  Submit {
    answer: String,
  },
  Retry,
  Abandon,
  CheckExpansion {
    #[serde(rename = "pathId")]
    path_id: PathId,
    #[serde(rename = "nodeCountBefore")]
    node_count_before: usize,
  },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  Status {
    node_id: NodeId,
    status: EffectiveNodeStatus,
  },
  Session {
    session: SessionOut,
  },
  Hint {
    text: String,
    hint_level: u32,
    exhausted: bool,
  },
  Evaluated {
    result: SubmitOut,
    session: SessionOut,
  },
  Expansion {
    report: ExpansionReport,
  },
  Abandoned,
  Error {
    code: String,
    message: String,
  },
}

/// DTO used by both WS and HTTP for session delivery.
#[derive(Debug, Serialize)]
pub struct SessionOut {
  pub challenge_id: ChallengeId,
  pub learner_id: LearnerId,
  pub path_id: PathId,
  pub node_id: NodeId,
  pub prompt: String,
  pub state: SessionState,
  pub hints: Vec<String>,
  pub hint_level: u32,
  pub hints_exhausted: bool,
  pub verdict: Option<TutorVerdict>,
  pub retry_allowed: bool,
  /// Token to carry across navigation for the expansion check.
  pub node_count_before: usize,
}

/// Convert the internal session value to the public DTO.
pub fn to_out(s: &ChallengeSession) -> SessionOut {
  SessionOut {
    challenge_id: s.challenge_id(),
    learner_id: s.learner().to_string(),
    path_id: s.path_id(),
    node_id: s.node_id(),
    prompt: s.prompt().to_string(),
    state: s.state(),
    hints: s.hints().to_vec(),
    hint_level: s.hint_level(),
    hints_exhausted: s.hints_exhausted(),
    verdict: s.verdict().cloned(),
    retry_allowed: s.retry_allowed(),
    node_count_before: s.node_count_token().node_count,
  }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
pub struct SubmitOut {
  pub score: f32,
  pub pass_node: bool,
  pub feedback_summary: String,
  pub suggestions: Vec<String>,
  pub progress: NodeProgress,
  pub completion_ratio: f32,
  pub unlocked: Vec<NodeId>,
  pub path_expanded: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expansion: Option<ExpansionReport>,
}

impl From<SubmitOutcome> for SubmitOut {
  fn from(o: SubmitOutcome) -> Self {
    Self {
      score: o.verdict.score,
      pass_node: o.verdict.pass_node,
      feedback_summary: o.verdict.feedback_summary,
      suggestions: o.verdict.suggestions,
      progress: o.progress,
      completion_ratio: o.completion_ratio,
      unlocked: o.unlocked,
      path_expanded: o.expansion.map(|r| r.expanded).unwrap_or(false),
      expansion: o.expansion,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct SubmitIn {
  pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct HintIn {
  #[serde(alias = "hintLevel")]
  pub hint_level: u32,
}
#[derive(Debug, Serialize)]
pub struct HintOut {
  pub hint: String,
  pub hint_level: u32,
  pub exhausted: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusOut {
  pub path_id: PathId,
  pub node_id: NodeId,
  pub status: EffectiveNodeStatus,
}

#[derive(Debug, Deserialize)]
pub struct PathIn {
  pub goal_title: String,
  #[serde(default)]
  pub nodes: Vec<Node>,
  #[serde(default)]
  pub edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
pub struct InsertNodeIn {
  pub node: NodeDraft,
  #[serde(default)]
  pub prereqs: Vec<NodeId>,
  #[serde(default)]
  pub unlocks: Vec<NodeId>,
}
#[derive(Debug, Serialize)]
pub struct InsertNodeOut {
  pub node: Node,
  pub node_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExpansionIn {
  pub node_count_before: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExpansionQuery {
  pub before: usize,
  pub after: usize,
}
#[derive(Debug, Serialize)]
pub struct ExpansionOut {
  pub expanded: bool,
}

#[derive(Serialize)]
pub struct DeletedOut {
  pub deleted: i64,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}
