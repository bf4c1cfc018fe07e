//! Local, deterministic tutor behaviors used when OpenAI is disabled or fails.
//!
//!   - authoring a challenge from the node's type, title and description
//!   - grading against the rubric (length + keyword coverage - avoided terms)
//!   - a fixed hint ladder that walks the expected outline

use crate::config::TutorSettings;
use crate::domain::{HintReply, Node, NodeType, Rubric, TutorVerdict};
use crate::util::content_words;

const MAX_KEYWORDS: usize = 5;
const LENGTH_WEIGHT: f32 = 0.4;
const COVERAGE_WEIGHT: f32 = 0.6;
const AVOID_PENALTY: f32 = 0.1;

/// Content needed to register a challenge.
#[derive(Clone, Debug)]
pub struct ChallengeDraft {
  pub prompt: String,
  pub expected_outline: Vec<String>,
  pub rubric: Rubric,
  pub difficulty: Option<String>,
}

pub fn challenge_local(node: &Node) -> ChallengeDraft {
  let meta = node.node_type.meta();
  let mut prompt = format!("{} \"{}\".", meta.task_verb, node.title);
  if !node.description.trim().is_empty() {
    prompt.push_str(&format!(" Context: {}", node.description.trim()));
  }

  let expected_outline = match node.node_type {
    NodeType::Concept => vec![
      format!("Define {} precisely", node.title),
      "Give a concrete example".to_string(),
      "Name a common misconception".to_string(),
    ],
    NodeType::Skill => vec![
      format!("List the steps to apply {}", node.title),
      "Explain how you would check the result".to_string(),
      "Mention a mistake to avoid".to_string(),
    ],
    NodeType::Project => vec![
      "State the project goal and scope".to_string(),
      format!("Show where {} is used", node.title),
      "Describe how you would know it works".to_string(),
    ],
    NodeType::Meta => vec![
      "Describe your current level honestly".to_string(),
      "Set one measurable next step".to_string(),
    ],
  };

  let keywords = content_words(&node.title, MAX_KEYWORDS);
  let rubric = Rubric {
    min_chars: Some(meta.min_chars),
    must_include: if keywords.is_empty() { None } else { Some(keywords) },
    avoid: None,
  };
  prompt.push_str(&format!(" Cover: {}.", expected_outline.join("; ")));

  ChallengeDraft { prompt, expected_outline, rubric, difficulty: Some("medium".into()) }
}

/// Grade an answer with the rubric. The score lands in [0, 1].
pub fn grade_local(rubric: &Rubric, settings: &TutorSettings, answer: &str) -> TutorVerdict {
  let answer_lc = answer.to_lowercase();
  let mut notes = vec![];
  let mut suggestions = vec![];

  let min_chars = settings.min_answer_chars.or(rubric.min_chars).unwrap_or(0);
  let len = answer.trim().chars().count();
  let length_part = if min_chars == 0 { 1.0 } else { (len as f32 / min_chars as f32).min(1.0) };
  if len < min_chars {
    notes.push(format!("Too short ({len} < {min_chars} chars)"));
    suggestions.push("Expand your answer with an example and the reasoning behind it.".to_string());
  }

  let required = rubric.must_include.as_deref().unwrap_or(&[]);
  let missing: Vec<&String> = required.iter().filter(|w| !answer_lc.contains(&w.to_lowercase())).collect();
  let coverage_part = if required.is_empty() {
    1.0
  } else {
    (required.len() - missing.len()) as f32 / required.len() as f32
  };
  for w in &missing {
    notes.push(format!("Missing '{w}'"));
    suggestions.push(format!("Explain how '{w}' fits into your answer."));
  }

  let mut score = LENGTH_WEIGHT * length_part + COVERAGE_WEIGHT * coverage_part;
  for w in rubric.avoid.as_deref().unwrap_or(&[]) {
    if answer_lc.contains(&w.to_lowercase()) {
      score -= AVOID_PENALTY;
      notes.push(format!("Avoid '{w}'"));
    }
  }
  let score = score.clamp(0.0, 1.0);
  let pass_node = score >= settings.pass_threshold;

  let mut feedback_summary = if notes.is_empty() { "Covers the expected points.".to_string() } else { notes.join("; ") };
  feedback_summary.push_str(&format!(" (local score {:.0}%)", score * 100.0));
  suggestions.truncate(2);

  TutorVerdict { score, pass_node, feedback_summary, suggestions }
}

/// Hint ladder: a nudge, one rung per outline item, then the key terms. The
/// key-terms rung and everything after it report exhaustion.
pub fn hint_local(title: &str, outline: &[String], rubric: &Rubric, level: u32) -> HintReply {
  let level = level as usize;
  if level == 0 {
    return HintReply { hint: format!("Start by saying in one sentence what \"{title}\" is for."), exhausted: false };
  }
  if let Some(item) = outline.get(level - 1) {
    return HintReply { hint: format!("Make sure your answer covers: {item}."), exhausted: false };
  }
  if level == outline.len() + 1 {
    let terms = rubric.must_include.as_deref().unwrap_or(&[]).join(", ");
    let hint = if terms.is_empty() {
      "Use the vocabulary from the challenge prompt explicitly.".to_string()
    } else {
      format!("Use these terms explicitly: {terms}.")
    };
    return HintReply { hint, exhausted: true };
  }
  HintReply { hint: "No further hints: you have everything you need to answer.".into(), exhausted: true }
}
