//! Path engine: lock resolution, challenge sessions and the progress write path.
//!
//! The engine owns the progress store and the in-flight submission set. Graphs
//! and challenge content come from the collaborators in `collaborators`.
//! Statuses are resolved from a fresh graph fetch and a fresh progress snapshot
//! on every call. Progress belongs to a learner; graphs and challenges do not.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex},
};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::adaptation::{check_path_expansion, ExpansionReport, NodeCountToken};
use crate::collaborators::{PathSource, Tutor};
use crate::domain::{
  AttemptRecord, ChallengeId, EffectiveNodeStatus, Edge, LearnerId, Node, NodeId, NodeProgress, PathId, PathProgress,
  TutorVerdict,
};
use crate::error::EngineError;
use crate::graph::GraphModel;
use crate::progress::{normalize_score, path_progress, ProgressStore};
use crate::resolver::{newly_unlocked, resolve, resolve_one};
use crate::session::ChallengeSession;

/// One node as shown on the path view.
#[derive(Clone, Debug, Serialize)]
pub struct NodeStatusView {
  #[serde(flatten)]
  pub node: Node,
  pub status: EffectiveNodeStatus,
  pub last_score: Option<f32>,
  pub attempts_count: u32,
  pub prereqs: Vec<NodeId>,
}

/// Path graph with effective statuses, nodes in prerequisite order.
#[derive(Clone, Debug, Serialize)]
pub struct PathStatusView {
  pub path_id: PathId,
  pub goal_title: String,
  pub node_count: usize,
  pub completion_ratio: f32,
  pub nodes: Vec<NodeStatusView>,
  pub edges: Vec<Edge>,
}

/// Everything a caller needs after a submission.
#[derive(Clone, Debug, Serialize)]
pub struct SubmitOutcome {
  pub verdict: TutorVerdict,
  pub progress: NodeProgress,
  pub completion_ratio: f32,
  /// Nodes that this submission unblocked.
  pub unlocked: Vec<NodeId>,
  /// `None` when the graph could not be refetched after the write.
  pub expansion: Option<ExpansionReport>,
}

#[derive(Clone)]
pub struct PathEngine {
  paths: Arc<dyn PathSource>,
  tutor: Arc<dyn Tutor>,
  progress: ProgressStore,
  in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
}

type InFlightKey = (LearnerId, ChallengeId);

impl PathEngine {
  pub fn new(paths: Arc<dyn PathSource>, tutor: Arc<dyn Tutor>, progress: ProgressStore) -> Self {
    Self { paths, tutor, progress, in_flight: Arc::new(Mutex::new(HashSet::new())) }
  }

  pub fn progress_store(&self) -> &ProgressStore { &self.progress }

  async fn graph(&self, path_id: PathId) -> Result<Arc<GraphModel>, EngineError> {
    let graph = self.paths.fetch_graph(path_id).await?;
    if !graph.dangling_edges().is_empty() {
      warn!(target: "catalog", %path_id, dangling = ?graph.dangling_edges(), "Ignoring edges that reference unknown nodes");
    }
    Ok(graph)
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn effective_status(
    &self,
    learner: &str,
    path_id: PathId,
    node_id: NodeId,
  ) -> Result<EffectiveNodeStatus, EngineError> {
    let graph = self.graph(path_id).await?;
    if !graph.contains(node_id) {
      return Err(EngineError::NodeNotFound { path_id, node_id });
    }
    let snapshot = self.progress.snapshot(learner, path_id).await;
    Ok(resolve_one(&graph, &snapshot, node_id))
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn statuses(&self, learner: &str, path_id: PathId) -> Result<PathStatusView, EngineError> {
    let graph = self.graph(path_id).await?;
    let snapshot = self.progress.snapshot(learner, path_id).await;
    let statuses = resolve(&graph, &snapshot);
    let summary = path_progress(&graph, &snapshot);

    let (mut order, cyclic) = graph.topological_order();
    if !cyclic.is_empty() {
      warn!(target: "catalog", %path_id, ?cyclic, "Prerequisite cycle detected; nodes listed last");
    }
    order.extend(cyclic);

    let nodes = order
      .into_iter()
      .filter_map(|id| {
        let node = graph.node(id)?.clone();
        let rec = snapshot.get(&id);
        let mut prereqs = graph.prereqs_of(id).to_vec();
        prereqs.sort_unstable();
        Some(NodeStatusView {
          node,
          status: statuses.get(&id).copied().unwrap_or(EffectiveNodeStatus::NotStarted),
          last_score: rec.and_then(|r| r.last_score),
          attempts_count: rec.map(|r| r.attempts_count).unwrap_or(0),
          prereqs,
        })
      })
      .collect();

    let snap = graph.snapshot();
    Ok(PathStatusView {
      path_id,
      goal_title: snap.goal_title,
      node_count: graph.node_count(),
      completion_ratio: summary.completion_ratio,
      nodes,
      edges: snap.edges,
    })
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn path_progress(&self, learner: &str, path_id: PathId) -> Result<PathProgress, EngineError> {
    let graph = self.graph(path_id).await?;
    let snapshot = self.progress.snapshot(learner, path_id).await;
    Ok(path_progress(&graph, &snapshot))
  }

  /// Open (or reopen) the challenge for an unblocked node.
  #[instrument(level = "info", skip(self))]
  pub async fn open_challenge(
    &self,
    learner: &str,
    path_id: PathId,
    node_id: NodeId,
  ) -> Result<ChallengeSession, EngineError> {
    let graph = self.graph(path_id).await?;
    let node = graph.node(node_id).ok_or(EngineError::NodeNotFound { path_id, node_id })?;

    let snapshot = self.progress.snapshot(learner, path_id).await;
    if resolve_one(&graph, &snapshot, node_id) == EffectiveNodeStatus::Blocked {
      info!(target: "challenge", %learner, %path_id, %node_id, "Refusing challenge for locked node");
      return Err(EngineError::Locked { node_id });
    }

    let ticket = self.tutor.create_or_fetch_challenge(&graph, node).await?;
    info!(target: "challenge", %learner, %path_id, %node_id, challenge_id = ticket.challenge_id, node_count = graph.node_count(), "Challenge session opened");
    Ok(ChallengeSession::new(learner.to_string(), path_id, node_id, ticket, graph.node_count()))
  }

  /// Next rung of the hint ladder. `hint_level` must equal the session's level.
  #[instrument(level = "info", skip(self, session), fields(challenge_id = session.challenge_id()))]
  pub async fn request_hint(&self, session: &mut ChallengeSession, hint_level: u32) -> Result<String, EngineError> {
    session.check_hint_request(hint_level)?;
    let reply = self.tutor.generate_hint(session.challenge_id(), hint_level).await?;
    if reply.exhausted {
      debug!(target: "challenge", challenge_id = session.challenge_id(), %hint_level, "Hint provider reports exhaustion");
    }
    Ok(session.record_hint(reply).to_string())
  }

  /// Score an answer and write the outcome into progress.
  ///
  /// At most one submission per (learner, challenge id) is in flight across all
  /// sessions.
  /// If scoring fails (or this future is dropped) the session goes back to
  /// `Active` and progress is untouched.
  #[instrument(level = "info", skip(self, session, answer), fields(challenge_id = session.challenge_id(), answer_len = answer.len()))]
  pub async fn submit(&self, session: &mut ChallengeSession, answer: &str) -> Result<SubmitOutcome, EngineError> {
    let challenge_id = session.challenge_id();
    let path_id = session.path_id();
    let node_id = session.node_id();
    let learner = session.learner().to_string();

    let claim = self.claim(&learner, challenge_id)?;
    session.begin_submit(answer)?;
    let attempt = SubmitAttempt { session, _claim: claim, settled: false };

    let raw = self.tutor.score(challenge_id, answer).await?;
    let verdict = TutorVerdict { score: normalize_score(raw.score)?, ..raw };

    let graph_before = self.graph(path_id).await?;
    let applied = self.progress.apply_verdict(&learner, path_id, node_id, challenge_id, answer, &verdict).await;
    let before = resolve(&graph_before, &applied.before);

    // Progress is written from here on; later failures only degrade the report.
    let (graph_after, expansion) = match self.graph(path_id).await {
      Ok(g) => {
        let count = g.node_count();
        let report = ExpansionReport::compare(attempt.session.node_count_token(), count);
        (g, Some(report))
      }
      Err(e) => {
        warn!(target: "challenge", %path_id, error = %e, "Graph refetch after submission failed");
        (graph_before, None)
      }
    };
    let after = resolve(&graph_after, &applied.snapshot);
    let unlocked = newly_unlocked(&before, &after);
    let completion_ratio = path_progress(&graph_after, &applied.snapshot).completion_ratio;

    if verdict.pass_node {
      if let Err(e) = self.tutor.mark_passed(challenge_id).await {
        warn!(target: "challenge", %challenge_id, error = %e, "Tutor could not retire passed challenge");
      }
    }

    info!(
      target: "challenge",
      %learner, %path_id, %node_id, %challenge_id,
      score = %format!("{:.2}", verdict.score),
      passed = verdict.pass_node,
      attempts = applied.record.attempts_count,
      ?unlocked,
      expanded = expansion.map(|r| r.expanded).unwrap_or(false),
      "Submission evaluated"
    );

    attempt.settle(verdict.clone());
    Ok(SubmitOutcome { verdict, progress: applied.record, completion_ratio, unlocked, expansion })
  }

  /// `Evaluated{fail} -> Active` with the same challenge id.
  pub fn retry(&self, session: &mut ChallengeSession) -> Result<(), EngineError> {
    session.retry()?;
    debug!(target: "challenge", challenge_id = session.challenge_id(), "Session reset for retry");
    Ok(())
  }

  pub fn check_path_expansion(&self, before: usize, after: usize) -> bool {
    check_path_expansion(before, after)
  }

  /// Compare a carried node-count token against a fresh graph fetch.
  #[instrument(level = "debug", skip(self))]
  pub async fn detect_expansion(&self, token: NodeCountToken) -> Result<ExpansionReport, EngineError> {
    let graph = self.graph(token.path_id).await?;
    Ok(ExpansionReport::compare(token, graph.node_count()))
  }

  pub async fn attempts_for(&self, learner: &str, challenge_id: ChallengeId) -> Vec<AttemptRecord> {
    self.progress.attempts(learner, challenge_id).await
  }

  /// A path was deleted: drop every learner's progress on it and the
  /// challenges authored for its nodes.
  pub async fn forget_path(&self, path_id: PathId) {
    self.progress.clear_path(path_id).await;
    self.tutor.forget_path(path_id).await;
  }

  /// A path was replaced wholesale. Progress is kept, since node ids may carry
  /// over, but challenges authored for the old nodes are retired.
  pub async fn retire_challenges(&self, path_id: PathId) {
    self.tutor.forget_path(path_id).await;
  }

  fn claim(&self, learner: &str, challenge_id: ChallengeId) -> Result<InFlightClaim, EngineError> {
    let key = (learner.to_string(), challenge_id);
    let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
    if !set.insert(key.clone()) {
      return Err(EngineError::AlreadySubmitting(challenge_id));
    }
    Ok(InFlightClaim { set: self.in_flight.clone(), key })
  }
}

/// Membership in the in-flight set; released on drop.
struct InFlightClaim {
  set: Arc<Mutex<HashSet<InFlightKey>>>,
  key: InFlightKey,
}

impl Drop for InFlightClaim {
  fn drop(&mut self) {
    self.set.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.key);
  }
}

/// A session in `Submitting`. Unless settled with a verdict, dropping it puts
/// the session back to `Active`.
struct SubmitAttempt<'a> {
  session: &'a mut ChallengeSession,
  _claim: InFlightClaim,
  settled: bool,
}

impl SubmitAttempt<'_> {
  fn settle(mut self, verdict: TutorVerdict) {
    self.session.finish_submit(verdict);
    self.settled = true;
  }
}

impl Drop for SubmitAttempt<'_> {
  fn drop(&mut self) {
    if !self.settled {
      self.session.abort_submit();
    }
  }
}
