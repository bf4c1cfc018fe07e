//! Progress store: per-node records and the attempt log for each learner and path.
//!
//! Single writer path: `apply_verdict`, called by the engine after a scored
//! submission. The record update, the attempt-log append and both snapshots
//! handed back to the caller (before and after the write) all happen under one
//! write lock, so concurrent submissions on different nodes never drop each
//! other's updates and readers never observe a half-applied record.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
  AttemptRecord, ChallengeId, LearnerId, NodeId, NodeProgress, NodeProgressItem, PathId, PathProgress, ProgressStatus,
  TutorVerdict,
};
use crate::error::EngineError;
use crate::graph::GraphModel;

type LedgerKey = (LearnerId, PathId);

#[derive(Debug, Default)]
struct PathLedger {
  records: HashMap<NodeId, NodeProgress>,
  attempts: Vec<AttemptRecord>,
}

/// Result of one applied verdict.
#[derive(Debug, Clone)]
pub struct AppliedVerdict {
  pub record: NodeProgress,
  /// Record map right before the write.
  pub before: HashMap<NodeId, NodeProgress>,
  /// Record map right after the write.
  pub snapshot: HashMap<NodeId, NodeProgress>,
}

#[derive(Clone, Default)]
pub struct ProgressStore {
  ledgers: Arc<RwLock<HashMap<LedgerKey, PathLedger>>>,
}

fn key(learner: &str, path_id: PathId) -> LedgerKey {
  (learner.to_string(), path_id)
}

impl ProgressStore {
  pub fn new() -> Self { Self::default() }

  /// Copy of every record for the learner on this path (empty when nothing was attempted yet).
  #[instrument(level = "debug", skip(self))]
  pub async fn snapshot(&self, learner: &str, path_id: PathId) -> HashMap<NodeId, NodeProgress> {
    let ledgers = self.ledgers.read().await;
    ledgers.get(&key(learner, path_id)).map(|l| l.records.clone()).unwrap_or_default()
  }

  /// Apply the update protocol for one verdict and log the attempt.
  #[instrument(level = "debug", skip(self, answer, verdict), fields(%learner, %path_id, %node_id, %challenge_id))]
  pub async fn apply_verdict(
    &self,
    learner: &str,
    path_id: PathId,
    node_id: NodeId,
    challenge_id: ChallengeId,
    answer: &str,
    verdict: &TutorVerdict,
  ) -> AppliedVerdict {
    let mut ledgers = self.ledgers.write().await;
    let ledger = ledgers.entry(key(learner, path_id)).or_default();
    let before = ledger.records.clone();

    let record = next_record(ledger.records.get(&node_id), node_id, verdict);
    ledger.records.insert(node_id, record.clone());
    ledger.attempts.push(AttemptRecord {
      attempt_id: Uuid::new_v4(),
      challenge_id,
      node_id,
      answer: answer.to_string(),
      score: verdict.score,
      pass_node: verdict.pass_node,
      feedback_summary: verdict.feedback_summary.clone(),
    });

    debug!(target: "progress", %learner, %path_id, %node_id, status = ?record.status, attempts = record.attempts_count, "Progress record written");
    AppliedVerdict { record, before, snapshot: ledger.records.clone() }
  }

  /// The learner's attempts on one challenge, oldest first. Challenge ids are
  /// unique across paths, so no path is needed.
  pub async fn attempts(&self, learner: &str, challenge_id: ChallengeId) -> Vec<AttemptRecord> {
    let ledgers = self.ledgers.read().await;
    ledgers
      .iter()
      .filter(|((l, _), _)| l == learner)
      .flat_map(|(_, ledger)| ledger.attempts.iter().filter(move |a| a.challenge_id == challenge_id).cloned())
      .collect()
  }

  /// Drop every learner's progress on a path (used when the path itself is deleted).
  pub async fn clear_path(&self, path_id: PathId) {
    self.ledgers.write().await.retain(|(_, p), _| *p != path_id);
  }
}

/// Update protocol for one verdict.
///
/// `attempts_count` always increments and `last_score` is always overwritten.
/// A pass completes the node; a fail moves `not_started` to `in_progress` and
/// otherwise leaves the status alone, so `completed` never regresses.
pub fn next_record(prev: Option<&NodeProgress>, node_id: NodeId, verdict: &TutorVerdict) -> NodeProgress {
  let prev_status = prev.map(|p| p.status).unwrap_or_default();
  let status = if verdict.pass_node {
    ProgressStatus::Completed
  } else if prev_status == ProgressStatus::NotStarted {
    ProgressStatus::InProgress
  } else {
    prev_status
  };
  NodeProgress {
    node_id,
    status,
    last_score: Some(verdict.score),
    attempts_count: prev.map(|p| p.attempts_count).unwrap_or(0).saturating_add(1),
  }
}

/// Path-level view: one entry per graph node (sorted by id) plus the
/// completed/total ratio. Records for nodes no longer in the graph are ignored.
pub fn path_progress(graph: &GraphModel, records: &HashMap<NodeId, NodeProgress>) -> PathProgress {
  let mut nodes: Vec<NodeProgressItem> = graph
    .nodes()
    .map(|node| {
      let rec = records.get(&node.id).cloned().unwrap_or_else(|| NodeProgress::untouched(node.id));
      NodeProgressItem {
        node_id: node.id,
        title: node.title.clone(),
        status: rec.status,
        last_score: rec.last_score,
        attempts_count: rec.attempts_count,
      }
    })
    .collect();
  nodes.sort_by_key(|n| n.node_id);
  let completed = nodes.iter().filter(|n| n.status == ProgressStatus::Completed).count();
  let completion_ratio = if nodes.is_empty() { 0.0 } else { completed as f32 / nodes.len() as f32 };

  PathProgress { path_id: graph.path_id(), completion_ratio, nodes }
}

/// Bring a collaborator score into [0, 1]. Values in (1, 100] are read as
/// percentages; anything else out of range is clamped. NaN is rejected.
pub fn normalize_score(raw: f32) -> Result<f32, EngineError> {
  if raw.is_nan() {
    return Err(EngineError::UpstreamUnavailable("tutor returned a NaN score".into()));
  }
  let s = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
  Ok(s.clamp(0.0, 1.0))
}
