//! Domain models: path nodes/edges, per-node progress, tutor verdicts and attempt records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PathId = i64;
pub type NodeId = i64;
pub type ChallengeId = i64;
/// Opaque learner identity. Progress, attempts and sessions are scoped by it.
pub type LearnerId = String;

/// Learner used when a request does not name one.
pub const DEFAULT_LEARNER: &str = "local";

/// What kind of unit a node represents on the path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
  #[default]
  Concept,
  Skill,
  Project,
  Meta,
}

/// Presentation/generation hints attached to each node type.
#[derive(Clone, Copy, Debug)]
pub struct NodeTypeMeta {
  pub label: &'static str,
  /// Opening of a locally generated challenge prompt for this type.
  pub task_verb: &'static str,
  /// Minimum answer length (chars) the local rubric expects.
  pub min_chars: usize,
}

impl NodeType {
  pub fn meta(self) -> NodeTypeMeta {
    match self {
      NodeType::Concept => NodeTypeMeta { label: "Concept", task_verb: "Explain in your own words", min_chars: 80 },
      NodeType::Skill => NodeTypeMeta { label: "Skill", task_verb: "Describe step by step how you would apply", min_chars: 120 },
      NodeType::Project => NodeTypeMeta { label: "Project", task_verb: "Outline a small project that demonstrates", min_chars: 160 },
      NodeType::Meta => NodeTypeMeta { label: "Reflection", task_verb: "Reflect on how you will approach", min_chars: 60 },
    }
  }
}

/// One skill/concept unit on a path. Immutable once fetched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Node {
  pub id: NodeId,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub node_type: NodeType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub estimated_minutes: Option<u32>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
}

/// `from_node_id` must be completed before `to_node_id` is reachable.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
  #[serde(alias = "from")]
  pub from_node_id: NodeId,
  #[serde(alias = "to")]
  pub to_node_id: NodeId,
}

/// Persisted status of a node's progress record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
  #[default]
  NotStarted,
  InProgress,
  Completed,
}

/// Status actually shown and enforced; `Blocked` overrides the stored status
/// while any prerequisite is incomplete.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveNodeStatus {
  Blocked,
  NotStarted,
  InProgress,
  Completed,
}

impl From<ProgressStatus> for EffectiveNodeStatus {
  fn from(s: ProgressStatus) -> Self {
    match s {
      ProgressStatus::NotStarted => EffectiveNodeStatus::NotStarted,
      ProgressStatus::InProgress => EffectiveNodeStatus::InProgress,
      ProgressStatus::Completed => EffectiveNodeStatus::Completed,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeProgress {
  pub node_id: NodeId,
  pub status: ProgressStatus,
  pub last_score: Option<f32>,
  pub attempts_count: u32,
}

impl NodeProgress {
  /// Record rendered for a node that has never been attempted.
  pub fn untouched(node_id: NodeId) -> Self {
    Self { node_id, status: ProgressStatus::NotStarted, last_score: None, attempts_count: 0 }
  }
}

/// One node's line in `PathProgress`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeProgressItem {
  pub node_id: NodeId,
  pub title: String,
  pub status: ProgressStatus,
  pub last_score: Option<f32>,
  pub attempts_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PathProgress {
  pub path_id: PathId,
  pub completion_ratio: f32,
  pub nodes: Vec<NodeProgressItem>,
}

/// Scored feedback for one submission, produced by the tutor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TutorVerdict {
  pub score: f32,
  pub pass_node: bool,
  pub feedback_summary: String,
  #[serde(default)]
  pub suggestions: Vec<String>,
}

/// Reply of the tutor's create-or-fetch call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChallengeTicket {
  pub challenge_id: ChallengeId,
  pub prompt: String,
}

/// Reply of the tutor's hint call. `exhausted` marks the last useful hint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HintReply {
  pub hint: String,
  #[serde(default)]
  pub exhausted: bool,
}

/// Optional grading rubric attached to a generated challenge.
#[derive(Clone, Debug, Deserialize, Default, Serialize, PartialEq)]
pub struct Rubric {
  #[serde(default)] pub min_chars: Option<usize>,
  #[serde(default)] pub must_include: Option<Vec<String>>,
  #[serde(default)] pub avoid: Option<Vec<String>>,
}

/// One logged submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptRecord {
  pub attempt_id: Uuid,
  pub challenge_id: ChallengeId,
  pub node_id: NodeId,
  pub answer: String,
  pub score: f32,
  pub pass_node: bool,
  pub feedback_summary: String,
}
