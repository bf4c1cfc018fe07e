//! Challenge session: the per-attempt state machine for one node.
//!
//! ```text
//!  open ──► Active ──submit──► Submitting ──verdict──► Evaluated{passed}
//!             ▲                    │                        │
//!             └──── upstream error ┘          passed=false ─┘ retry
//! ```
//!
//! The session is a plain value. Every operation takes it explicitly and
//! returns the outcome; there is no ambient state. Dropping it abandons the
//! attempt without touching progress.

use serde::Serialize;

use crate::adaptation::NodeCountToken;
use crate::domain::{ChallengeId, ChallengeTicket, HintReply, LearnerId, NodeId, PathId, TutorVerdict};
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionState {
  Active,
  Submitting,
  Evaluated { passed: bool },
}

#[derive(Clone, Debug)]
pub struct ChallengeSession {
  learner: LearnerId,
  challenge_id: ChallengeId,
  path_id: PathId,
  node_id: NodeId,
  prompt: String,
  hints: Vec<String>,
  hint_level: u32,
  hints_exhausted: bool,
  answer: Option<String>,
  verdict: Option<TutorVerdict>,
  state: SessionState,
  node_count_before: usize,
}

impl ChallengeSession {
  /// Fresh `Active` session for a ticket handed out by the tutor.
  pub fn new(learner: LearnerId, path_id: PathId, node_id: NodeId, ticket: ChallengeTicket, node_count_before: usize) -> Self {
    Self {
      learner,
      challenge_id: ticket.challenge_id,
      path_id,
      node_id,
      prompt: ticket.prompt,
      hints: Vec::new(),
      hint_level: 0,
      hints_exhausted: false,
      answer: None,
      verdict: None,
      state: SessionState::Active,
      node_count_before,
    }
  }

  pub fn learner(&self) -> &str { &self.learner }
  pub fn challenge_id(&self) -> ChallengeId { self.challenge_id }
  pub fn path_id(&self) -> PathId { self.path_id }
  pub fn node_id(&self) -> NodeId { self.node_id }
  pub fn prompt(&self) -> &str { &self.prompt }
  pub fn hints(&self) -> &[String] { &self.hints }
  pub fn hint_level(&self) -> u32 { self.hint_level }
  pub fn hints_exhausted(&self) -> bool { self.hints_exhausted }
  pub fn answer(&self) -> Option<&str> { self.answer.as_deref() }
  pub fn verdict(&self) -> Option<&TutorVerdict> { self.verdict.as_ref() }
  pub fn state(&self) -> SessionState { self.state }

  /// Token the caller keeps across navigation for the expansion check.
  pub fn node_count_token(&self) -> NodeCountToken {
    NodeCountToken { path_id: self.path_id, node_count: self.node_count_before }
  }

  pub fn retry_allowed(&self) -> bool {
    self.state == SessionState::Evaluated { passed: false }
  }

  /// Validate a hint request before the provider is called.
  pub fn check_hint_request(&self, hint_level: u32) -> Result<(), EngineError> {
    self.require_active("request a hint")?;
    if hint_level != self.hint_level {
      return Err(EngineError::InvalidHintLevel { expected: self.hint_level, got: hint_level });
    }
    Ok(())
  }

  /// Append a provider hint and advance the ladder by one.
  pub fn record_hint(&mut self, reply: HintReply) -> &str {
    self.hints.push(reply.hint);
    self.hint_level += 1;
    self.hints_exhausted |= reply.exhausted;
    self.hints.last().map(String::as_str).unwrap_or_default()
  }

  /// `Active -> Submitting`.
  pub fn begin_submit(&mut self, answer: &str) -> Result<(), EngineError> {
    match self.state {
      SessionState::Submitting => return Err(EngineError::AlreadySubmitting(self.challenge_id)),
      SessionState::Evaluated { passed: true } => {
        return Err(EngineError::InvalidState("challenge already passed".into()))
      }
      SessionState::Evaluated { passed: false } => {
        return Err(EngineError::InvalidState("retry before submitting again".into()))
      }
      SessionState::Active => {}
    }
    if answer.trim().is_empty() {
      return Err(EngineError::EmptyAnswer);
    }
    self.answer = Some(answer.to_string());
    self.state = SessionState::Submitting;
    Ok(())
  }

  /// `Submitting -> Active` after a failed collaborator call; the answer is kept
  /// so the caller can resubmit it.
  pub fn abort_submit(&mut self) {
    if self.state == SessionState::Submitting {
      self.state = SessionState::Active;
    }
  }

  /// `Submitting -> Evaluated`.
  pub fn finish_submit(&mut self, verdict: TutorVerdict) {
    self.state = SessionState::Evaluated { passed: verdict.pass_node };
    self.verdict = Some(verdict);
  }

  /// `Evaluated{fail} -> Active`, same challenge identity, clean ladder.
  pub fn retry(&mut self) -> Result<(), EngineError> {
    if !self.retry_allowed() {
      return Err(EngineError::InvalidState(format!("retry not allowed from {:?}", self.state)));
    }
    self.hints.clear();
    self.hint_level = 0;
    self.hints_exhausted = false;
    self.answer = None;
    self.verdict = None;
    self.state = SessionState::Active;
    Ok(())
  }

  fn require_active(&self, what: &str) -> Result<(), EngineError> {
    match self.state {
      SessionState::Active => Ok(()),
      SessionState::Submitting => Err(EngineError::AlreadySubmitting(self.challenge_id)),
      other => Err(EngineError::InvalidState(format!("cannot {what} in state {other:?}"))),
    }
  }
}
