//! Built-in tutor: a challenge bank keyed by node, backed by OpenAI when
//! configured and by the local rubric otherwise.
//!
//! This module owns:
//!   - challenges by id, and the active challenge id per (path, node)
//!   - the optional OpenAI client and its prompts
//!   - the local fallback policy

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
  },
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::Tutor;
use crate::config::{Prompts, TutorSettings};
use crate::domain::{ChallengeId, ChallengeTicket, HintReply, Node, NodeId, PathId, Rubric, TutorVerdict};
use crate::error::EngineError;
use crate::fallback::{challenge_local, grade_local, hint_local, ChallengeDraft};
use crate::graph::GraphModel;
use crate::openai::OpenAI;

/// Where did the challenge content come from?
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeSource {
  Generated,
  Local,
}

#[derive(Clone, Debug)]
pub struct ChallengeRecord {
  pub id: ChallengeId,
  pub path_id: PathId,
  pub node_id: NodeId,
  pub node_title: String,
  pub prompt: String,
  pub expected_outline: Vec<String>,
  pub rubric: Rubric,
  pub difficulty: Option<String>,
  pub source: ChallengeSource,
  pub passed: bool,
}

#[derive(Clone)]
pub struct TutorService {
  by_id: Arc<RwLock<HashMap<ChallengeId, ChallengeRecord>>>,
  active_by_node: Arc<RwLock<HashMap<(PathId, NodeId), ChallengeId>>>,
  next_id: Arc<AtomicI64>,
  openai: Option<OpenAI>,
  prompts: Prompts,
  settings: TutorSettings,
}

impl TutorService {
  pub fn new(openai: Option<OpenAI>, prompts: Prompts, settings: TutorSettings) -> Self {
    Self {
      by_id: Arc::new(RwLock::new(HashMap::new())),
      active_by_node: Arc::new(RwLock::new(HashMap::new())),
      next_id: Arc::new(AtomicI64::new(1)),
      openai,
      prompts,
      settings,
    }
  }

  /// Tutor that never calls out; handy for offline runs and tests.
  pub fn local(settings: TutorSettings) -> Self {
    Self::new(None, Prompts::default(), settings)
  }

  /// Read-only access to a challenge by id.
  pub async fn get_challenge(&self, id: ChallengeId) -> Option<ChallengeRecord> {
    self.by_id.read().await.get(&id).cloned()
  }

  async fn record(&self, id: ChallengeId) -> Result<ChallengeRecord, EngineError> {
    self.get_challenge(id).await.ok_or(EngineError::ChallengeNotFound(id))
  }

  async fn author(&self, graph: &GraphModel, node: &Node) -> Result<(ChallengeDraft, ChallengeSource), EngineError> {
    let Some(oa) = &self.openai else {
      return Ok((challenge_local(node), ChallengeSource::Local));
    };
    match oa.generate_challenge(&self.prompts, graph.goal_title(), node).await {
      Ok(gen) => {
        let local = challenge_local(node);
        let draft = ChallengeDraft {
          prompt: gen.prompt,
          expected_outline: if gen.expected_answer_outline.is_empty() { local.expected_outline } else { gen.expected_answer_outline },
          rubric: gen.rubric.unwrap_or(local.rubric),
          difficulty: gen.difficulty.or(local.difficulty),
        };
        Ok((draft, ChallengeSource::Generated))
      }
      Err(e) => self.fall_back("generate_challenge", e).map(|_| (challenge_local(node), ChallengeSource::Local)),
    }
  }

  fn fall_back(&self, call: &str, e: String) -> Result<(), EngineError> {
    if self.settings.fallback_to_local {
      warn!(target: "challenge", %call, error = %e, "OpenAI call failed; using local tutor");
      Ok(())
    } else {
      Err(EngineError::UpstreamUnavailable(format!("{call}: {e}")))
    }
  }
}

#[async_trait]
impl Tutor for TutorService {
  #[instrument(level = "info", skip(self, graph, node), fields(path_id = graph.path_id(), node_id = node.id))]
  async fn create_or_fetch_challenge(&self, graph: &GraphModel, node: &Node) -> Result<ChallengeTicket, EngineError> {
    let key = (graph.path_id(), node.id);
    let existing = { self.active_by_node.read().await.get(&key).copied() };
    if let Some(id) = existing {
      match self.get_challenge(id).await {
        Some(rec) if rec.node_title == node.title => {
          debug!(target: "challenge", challenge_id = id, "Reusing active challenge");
          return Ok(ChallengeTicket { challenge_id: rec.id, prompt: rec.prompt });
        }
        Some(_) => info!(target: "challenge", challenge_id = id, node_id = node.id, "Node changed since authoring; replacing challenge"),
        None => {}
      }
    }

    let (draft, source) = self.author(graph, node).await?;

    // Another caller may have registered one while we were authoring.
    let mut active = self.active_by_node.write().await;
    let mut by_id = self.by_id.write().await;
    if let Some(rec) = active.get(&key).and_then(|id| by_id.get(id)).filter(|r| r.node_title == node.title) {
      return Ok(ChallengeTicket { challenge_id: rec.id, prompt: rec.prompt.clone() });
    }

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let rec = ChallengeRecord {
      id,
      path_id: graph.path_id(),
      node_id: node.id,
      node_title: node.title.clone(),
      prompt: draft.prompt,
      expected_outline: draft.expected_outline,
      rubric: draft.rubric,
      difficulty: draft.difficulty,
      source,
      passed: false,
    };
    let ticket = ChallengeTicket { challenge_id: id, prompt: rec.prompt.clone() };
    by_id.insert(id, rec);
    active.insert(key, id);
    info!(target: "challenge", challenge_id = id, ?source, "Challenge registered");
    Ok(ticket)
  }

  #[instrument(level = "info", skip(self, answer), fields(answer_len = answer.len()))]
  async fn score(&self, challenge_id: ChallengeId, answer: &str) -> Result<TutorVerdict, EngineError> {
    let rec = self.record(challenge_id).await?;
    if let Some(oa) = &self.openai {
      let rubric_json = serde_json::to_string(&rec.rubric).unwrap_or_else(|_| "{}".into());
      match oa.grade(&self.prompts, &rec.prompt, &rec.expected_outline, &rubric_json, answer).await {
        Ok(g) => {
          return Ok(TutorVerdict {
            score: g.overall_score,
            pass_node: g.passed,
            feedback_summary: g.feedback_summary,
            suggestions: g.suggestions,
          })
        }
        Err(e) => self.fall_back("grade", e)?,
      }
    }
    Ok(grade_local(&rec.rubric, &self.settings, answer))
  }

  #[instrument(level = "info", skip(self))]
  async fn generate_hint(&self, challenge_id: ChallengeId, hint_level: u32) -> Result<HintReply, EngineError> {
    let rec = self.record(challenge_id).await?;
    let local = hint_local(&rec.node_title, &rec.expected_outline, &rec.rubric, hint_level);
    if let Some(oa) = &self.openai {
      // The local ladder decides exhaustion so both paths stop at the same rung.
      match oa.hint(&self.prompts, &rec.prompt, &rec.expected_outline, hint_level).await {
        Ok(hint) if !hint.is_empty() => return Ok(HintReply { hint, exhausted: local.exhausted }),
        Ok(_) => self.fall_back("hint", "empty hint".into())?,
        Err(e) => self.fall_back("hint", e)?,
      }
    }
    Ok(local)
  }

  async fn mark_passed(&self, challenge_id: ChallengeId) -> Result<(), EngineError> {
    // Same lock order as create_or_fetch_challenge: active, then by_id.
    let mut active = self.active_by_node.write().await;
    let mut by_id = self.by_id.write().await;
    let rec = by_id.get_mut(&challenge_id).ok_or(EngineError::ChallengeNotFound(challenge_id))?;
    rec.passed = true;
    let key = (rec.path_id, rec.node_id);
    if active.get(&key) == Some(&challenge_id) {
      active.remove(&key);
    }
    Ok(())
  }

  async fn forget_path(&self, path_id: PathId) {
    let mut active = self.active_by_node.write().await;
    let mut by_id = self.by_id.write().await;
    active.retain(|(p, _), _| *p != path_id);
    let before = by_id.len();
    by_id.retain(|_, rec| rec.path_id != path_id);
    info!(target: "challenge", %path_id, dropped = before - by_id.len(), "Challenges for path forgotten");
  }
}
