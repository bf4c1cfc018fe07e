//! Minimal OpenAI client for the tutor: challenge authoring, grading and hints.
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key or learner answers.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Node, Rubric};
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

/// Challenge content as returned by the model.
#[derive(Debug, Deserialize)]
pub struct GeneratedChallenge {
  pub prompt: String,
  #[serde(default)]
  pub expected_answer_outline: Vec<String>,
  #[serde(default)]
  pub rubric: Option<Rubric>,
  #[serde(default)]
  pub difficulty: Option<String>,
}

/// Grading reply; `overall_score` may come back as 0..1 or 0..100.
#[derive(Debug, Deserialize)]
pub struct Grade {
  #[serde(default)]
  pub overall_score: f32,
  #[serde(default, rename = "pass")]
  pub passed: bool,
  #[serde(default)]
  pub feedback_summary: String,
  #[serde(default)]
  pub suggestions: Vec<String>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  async fn chat(&self, req: &ChatCompletionRequest) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let res = self.client.post(&url)
      .header(USER_AGENT, "skillpath-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    Ok(body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string())
  }

  /// Plain-text chat completion. Used for hints.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String, String> {
    let req = ChatCompletionRequest::new(model, system, user, temperature, None);
    self.chat(&req).await
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<T, String> {
    let req = ChatCompletionRequest::new(
      model, system, user, temperature,
      Some(ResponseFormat { r#type: "json_object".into() }),
    );
    let text = self.chat(&req).await?;
    serde_json::from_str::<T>(&text).map_err(|e| {
      debug!(raw = %trunc_for_log(&text, 200), "Unparseable model JSON");
      format!("JSON parse error: {}", e)
    })
  }

  // --- High-level helpers (domain-specialized) ---

  /// Author a challenge for one node.
  #[instrument(level = "info", skip(self, prompts, goal, node), fields(node_id = node.id, model = %self.strong_model))]
  pub async fn generate_challenge(&self, prompts: &Prompts, goal: &str, node: &Node) -> Result<GeneratedChallenge, String> {
    let user = fill_template(
      &prompts.challenge_user_template,
      &[
        ("goal", goal),
        ("title", &node.title),
        ("description", &node.description),
        ("node_type", node.node_type.meta().label),
      ],
    );
    let start = std::time::Instant::now();
    let result = self.chat_json::<GeneratedChallenge>(&self.strong_model, &prompts.challenge_system, &user, 0.7).await;
    let elapsed = start.elapsed();

    match result {
      Ok(gen) if !gen.prompt.trim().is_empty() => {
        info!(?elapsed, prompt_len = gen.prompt.len(), outline = gen.expected_answer_outline.len(), "Challenge generated");
        Ok(gen)
      }
      Ok(_) => Err("model returned an empty prompt".into()),
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during challenge generation");
        Err(format!("Model generation failed: {e}"))
      }
    }
  }

  /// Grade an answer against the challenge outline and rubric.
  #[instrument(level = "info", skip(self, prompts, prompt, outline, rubric_json, answer), fields(answer_len = answer.len()))]
  pub async fn grade(
    &self,
    prompts: &Prompts,
    prompt: &str,
    outline: &[String],
    rubric_json: &str,
    answer: &str,
  ) -> Result<Grade, String> {
    let outline = outline.join("\n- ");
    let user = fill_template(
      &prompts.grading_user_template,
      &[("prompt", prompt), ("outline", &outline), ("rubric_json", rubric_json), ("answer", answer)],
    );
    self.chat_json(&self.strong_model, &prompts.grading_system, &user, 0.2).await
  }

  /// One rung of the hint ladder.
  #[instrument(level = "info", skip(self, prompts, prompt, outline), fields(%level))]
  pub async fn hint(&self, prompts: &Prompts, prompt: &str, outline: &[String], level: u32) -> Result<String, String> {
    let outline = outline.join("\n- ");
    let level_s = level.to_string();
    let user = fill_template(
      &prompts.hint_user_template,
      &[("prompt", prompt), ("outline", &outline), ("level", &level_s)],
    );
    self.chat_plain(&self.fast_model, &prompts.hint_system, &user, 0.3).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
  fn new(model: &str, system: &str, user: &str, temperature: f32, response_format: Option<ResponseFormat>) -> Self {
    Self {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format,
    }
  }
}

#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
