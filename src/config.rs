//! Loading engine configuration (tutor settings, prompts, seed paths) from TOML.
//!
//! Example:
//! ```toml
//! [tutor]
//! pass_threshold = 0.7
//! fallback_to_local = true
//!
//! [[paths]]
//! id = 10
//! goal_title = "Become a junior UX designer"
//! nodes = [
//!   { id = 1, title = "User research", node_type = "concept" },
//!   { id = 2, title = "Wireframing", node_type = "skill" },
//! ]
//! edges = [ { from = 1, to = 2 } ]
//! ```

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Edge, Node, PathId};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub tutor: TutorSettings,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub paths: Vec<PathCfg>,
}

/// Local grading and fallback behavior of the built-in tutor.
#[derive(Clone, Debug, Deserialize)]
pub struct TutorSettings {
  /// Minimum local score (0..1) that passes a node.
  #[serde(default = "default_pass_threshold")]
  pub pass_threshold: f32,
  /// Overrides the per-node-type minimum answer length.
  #[serde(default)]
  pub min_answer_chars: Option<usize>,
  /// Use the local rubric when the OpenAI call fails. When false the failure
  /// is surfaced to the caller as an upstream error.
  #[serde(default = "default_true")]
  pub fallback_to_local: bool,
}

fn default_pass_threshold() -> f32 { 0.7 }
fn default_true() -> bool { true }

impl Default for TutorSettings {
  fn default() -> Self {
    Self { pass_threshold: default_pass_threshold(), min_answer_chars: None, fallback_to_local: true }
  }
}

/// A path graph entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct PathCfg {
  pub id: PathId,
  pub goal_title: String,
  #[serde(default)]
  pub nodes: Vec<Node>,
  #[serde(default)]
  pub edges: Vec<Edge>,
}

/// Prompts used by the OpenAI client. Placeholders in `{braces}` are filled per call.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub challenge_system: String,
  pub challenge_user_template: String,
  pub grading_system: String,
  pub grading_user_template: String,
  pub hint_system: String,
  pub hint_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      challenge_system: "You design short, concrete challenges that certify mastery of one learning-path node. Respond ONLY with strict JSON.".into(),
      challenge_user_template: "Learning goal: {goal}\nNode ({node_type}): {title}\nDescription: {description}\n\nReturn JSON with fields: prompt (string), expected_answer_outline (array of 2-4 strings), rubric ({\"min_chars\": number, \"must_include\": [string]}), difficulty (\"easy\"|\"medium\"|\"hard\").".into(),
      grading_system: "You are a supportive, rigorous tutor for any skill or domain. Grade the learner's answer against the outline and rubric. Output STRICT JSON: {\"overall_score\": number 0..1, \"pass\": boolean, \"feedback_summary\": string, \"suggestions\": [1-2 actionable strings]}.".into(),
      grading_user_template: "Challenge prompt:\n{prompt}\n\nExpected answer outline:\n{outline}\n\nRubric:\n{rubric_json}\n\nLearner answer:\n{answer}".into(),
      hint_system: "You are a tutor giving progressively more specific hints. Never reveal a full answer. One or two sentences.".into(),
      hint_user_template: "Challenge prompt:\n{prompt}\n\nExpected answer outline:\n{outline}\n\nGive hint number {level} (0 = gentle nudge, higher = more specific).".into(),
    }
  }
}

/// Parse a TOML document into `EngineConfig`.
pub fn parse_config(s: &str) -> Result<EngineConfig, toml::de::Error> {
  toml::from_str::<EngineConfig>(s)
}

/// Attempt to load `EngineConfig` from ENGINE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "skillpath_backend", %path, paths = cfg.paths.len(), "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "skillpath_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "skillpath_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::NodeType;

  #[test]
  fn defaults_apply_to_empty_document() {
    let cfg = parse_config("").unwrap();
    assert_eq!(cfg.tutor.pass_threshold, 0.7);
    assert!(cfg.tutor.fallback_to_local);
    assert!(cfg.paths.is_empty());
    assert!(cfg.prompts.grading_user_template.contains("{answer}"));
  }

  #[test]
  fn paths_accept_short_edge_keys() {
    let cfg = parse_config(
      r#"
        [tutor]
        pass_threshold = 0.5

        [prompts]
        hint_system = "custom"

        [[paths]]
        id = 10
        goal_title = "UX"
        nodes = [
          { id = 1, title = "Research", node_type = "concept" },
          { id = 2, title = "Wireframes", node_type = "skill", estimated_minutes = 30 },
        ]
        edges = [ { from = 1, to = 2 } ]
      "#,
    )
    .unwrap();
    assert_eq!(cfg.tutor.pass_threshold, 0.5);
    assert_eq!(cfg.prompts.hint_system, "custom");
    assert!(!cfg.prompts.challenge_system.is_empty());
    let p = &cfg.paths[0];
    assert_eq!(p.nodes[1].node_type, NodeType::Skill);
    assert_eq!(p.nodes[1].estimated_minutes, Some(30));
    assert_eq!(p.edges[0], Edge { from_node_id: 1, to_node_id: 2 });
  }
}
