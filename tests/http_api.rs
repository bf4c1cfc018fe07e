//! HTTP API tests over the seeded path with the local tutor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use skillpath_backend::catalog::InMemoryCatalog;
use skillpath_backend::collaborators::Tutor;
use skillpath_backend::config::{EngineConfig, TutorSettings};
use skillpath_backend::domain::{ChallengeId, ChallengeTicket, HintReply, Node, PathId, TutorVerdict};
use skillpath_backend::error::EngineError;
use skillpath_backend::graph::GraphModel;
use skillpath_backend::routes::build_router;
use skillpath_backend::seeds::seed_paths;
use skillpath_backend::state::AppState;
use skillpath_backend::tutor::TutorService;

const THOROUGH: &str = "Ownership means every value has exactly one owner, and when that owner goes out of scope the value is dropped automatically.";

async fn test_app() -> Router {
  let state = AppState::from_config(EngineConfig::default(), None).await;
  build_router(state)
}

/// Local tutor whose hint calls can be held open until released.
struct GatedTutor {
  inner: TutorService,
  gate_hints: AtomicBool,
  hint_entered: Notify,
  hint_release: Notify,
}

#[async_trait]
impl Tutor for GatedTutor {
  async fn create_or_fetch_challenge(&self, graph: &GraphModel, node: &Node) -> Result<ChallengeTicket, EngineError> {
    self.inner.create_or_fetch_challenge(graph, node).await
  }

  async fn score(&self, challenge_id: ChallengeId, answer: &str) -> Result<TutorVerdict, EngineError> {
    self.inner.score(challenge_id, answer).await
  }

  async fn generate_hint(&self, challenge_id: ChallengeId, hint_level: u32) -> Result<HintReply, EngineError> {
    if self.gate_hints.swap(false, Ordering::SeqCst) {
      self.hint_entered.notify_one();
      self.hint_release.notified().await;
    }
    self.inner.generate_hint(challenge_id, hint_level).await
  }

  async fn mark_passed(&self, challenge_id: ChallengeId) -> Result<(), EngineError> {
    self.inner.mark_passed(challenge_id).await
  }

  async fn forget_path(&self, path_id: PathId) {
    self.inner.forget_path(path_id).await
  }
}

async fn gated_app() -> (Router, Arc<GatedTutor>) {
  let catalog = InMemoryCatalog::new();
  for p in seed_paths() {
    catalog.load(p).await.unwrap();
  }
  let tutor = Arc::new(GatedTutor {
    inner: TutorService::local(TutorSettings::default()),
    gate_hints: AtomicBool::new(false),
    hint_entered: Notify::new(),
    hint_release: Notify::new(),
  });
  let as_tutor: Arc<dyn Tutor> = tutor.clone();
  (build_router(AppState::with_collaborators(catalog, as_tutor)), tutor)
}

async fn request_as(
  app: &Router,
  learner: Option<&str>,
  method: Method,
  path: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(path);
  if let Some(learner) = learner {
    builder = builder.header("x-learner-id", learner);
  }
  let body = match body {
    Some(v) => {
      builder = builder.header("content-type", "application/json");
      Body::from(serde_json::to_vec(&v).unwrap())
    }
    None => Body::empty(),
  };

  let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = response.status();
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
  (status, json)
}

async fn request_json(app: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
  request_as(app, None, method, path, body).await
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
  request_json(app, Method::GET, path, None).await
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
  request_json(app, Method::POST, path, Some(body)).await
}

async fn open_challenge(app: &Router, node_id: i64) -> i64 {
  let (status, body) = request_json(app, Method::POST, &format!("/api/v1/paths/1/nodes/{node_id}/challenge"), None).await;
  assert_eq!(status, StatusCode::OK, "open challenge failed: {body:?}");
  body["challenge_id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_and_seeded_inventory() {
  let app = test_app().await;
  let (status, body) = get_json(&app, "/api/v1/health").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["ok"], true);

  let (status, body) = get_json(&app, "/api/v1/paths").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body[0]["path_id"], 1);
  assert_eq!(body[0]["node_count"], 5);
}

#[tokio::test]
async fn path_view_marks_locked_nodes() {
  let app = test_app().await;
  let (status, body) = get_json(&app, "/api/v1/paths/1").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["nodes"][0]["id"], 1);
  assert_eq!(body["nodes"][0]["status"], "not_started");
  assert_eq!(body["nodes"][1]["status"], "blocked");
  assert_eq!(body["edges"].as_array().unwrap().len(), 5);

  let (status, body) = get_json(&app, "/api/v1/paths/1/nodes/5/status").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "blocked");

  let (status, body) = get_json(&app, "/api/v1/paths/1/nodes/99/status").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn locked_node_refuses_challenge() {
  let app = test_app().await;
  let (status, body) = request_json(&app, Method::POST, "/api/v1/paths/1/nodes/2/challenge", None).await;
  assert_eq!(status, StatusCode::LOCKED);
  assert_eq!(body["error"]["code"], "LOCKED");
}

#[tokio::test]
async fn reopening_returns_the_same_session() {
  let app = test_app().await;
  let id = open_challenge(&app, 1).await;
  let (status, _) = post_json(&app, &format!("/api/v1/challenges/{id}/hint"), json!({ "hint_level": 0 })).await;
  assert_eq!(status, StatusCode::OK);

  assert_eq!(open_challenge(&app, 1).await, id);
  let (_, session) = get_json(&app, &format!("/api/v1/challenges/{id}")).await;
  assert_eq!(session["hint_level"], 1);
  assert_eq!(session["state"]["kind"], "active");
  assert_eq!(session["node_count_before"], 5);
}

#[tokio::test]
async fn hints_must_be_requested_in_order() {
  let app = test_app().await;
  let id = open_challenge(&app, 1).await;

  let (status, body) = post_json(&app, &format!("/api/v1/challenges/{id}/hint"), json!({ "hintLevel": 0 })).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["hint_level"], 1);
  assert_eq!(body["exhausted"], false);
  assert!(body["hint"].as_str().unwrap().contains("Ownership"));

  let (status, body) = post_json(&app, &format!("/api/v1/challenges/{id}/hint"), json!({ "hint_level": 0 })).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "INVALID_HINT_LEVEL");
}

#[tokio::test]
async fn fail_retry_pass_unlocks_next_node() {
  let app = test_app().await;
  let id = open_challenge(&app, 1).await;

  let (status, body) = post_json(&app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": "no idea" })).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["pass_node"], false);
  assert_eq!(body["progress"]["status"], "in_progress");
  assert_eq!(body["path_expanded"], false);

  // Submitting again without a retry is a state error.
  let (status, _) = post_json(&app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": THOROUGH })).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, body) = request_json(&app, Method::POST, &format!("/api/v1/challenges/{id}/retry"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["challenge_id"], id);
  assert_eq!(body["state"]["kind"], "active");

  let (status, body) = post_json(&app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": THOROUGH })).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["pass_node"], true);
  assert_eq!(body["progress"]["attempts_count"], 2);
  assert_eq!(body["unlocked"], json!([2]));
  assert!((body["completion_ratio"].as_f64().unwrap() - 0.2).abs() < 1e-6);

  let (_, attempts) = get_json(&app, &format!("/api/v1/challenges/{id}/attempts")).await;
  assert_eq!(attempts.as_array().unwrap().len(), 2);

  let (_, progress) = get_json(&app, "/api/v1/paths/1/progress").await;
  assert_eq!(progress["nodes"][0]["title"], "Ownership");
  assert_eq!(progress["nodes"][0]["status"], "completed");
  assert_eq!(progress["nodes"][1]["status"], "not_started");

  let (status, _) = request_json(&app, Method::POST, "/api/v1/paths/1/nodes/2/challenge", None).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_answer_is_a_bad_request() {
  let app = test_app().await;
  let id = open_challenge(&app, 1).await;
  let (status, body) = post_json(&app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": "  " })).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "EMPTY_ANSWER");

  let (_, session) = get_json(&app, &format!("/api/v1/challenges/{id}")).await;
  assert_eq!(session["state"]["kind"], "active");
}

#[tokio::test]
async fn inserted_node_is_detected_as_expansion() {
  let app = test_app().await;
  let (status, body) = post_json(
    &app,
    "/api/v1/paths/1/nodes",
    json!({ "node": { "title": "Moves and copies", "node_type": "concept" }, "prereqs": [1], "unlocks": [2] }),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "insert failed: {body:?}");
  assert_eq!(body["node"]["id"], 6);
  assert_eq!(body["node_count"], 6);

  let (_, report) = post_json(&app, "/api/v1/paths/1/expansion", json!({ "node_count_before": 5 })).await;
  assert_eq!(report["expanded"], true);
  assert_eq!(report["node_count_after"], 6);

  let (_, out) = get_json(&app, "/api/v1/expansion?before=6&after=6").await;
  assert_eq!(out["expanded"], false);
}

#[tokio::test]
async fn put_and_delete_paths() {
  let app = test_app().await;
  let (status, body) = request_json(
    &app,
    Method::PUT,
    "/api/v1/paths/7",
    Some(json!({
      "goal_title": "Brew espresso",
      "nodes": [{ "id": 1, "title": "Grind size" }, { "id": 2, "title": "Extraction", "node_type": "skill" }],
      "edges": [{ "from": 1, "to": 2 }, { "from": 2, "to": 9 }]
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "put failed: {body:?}");
  assert_eq!(body["node_count"], 2);
  assert_eq!(body["edges"].as_array().unwrap().len(), 1);

  let (status, body) = request_json(
    &app,
    Method::PUT,
    "/api/v1/paths/8",
    Some(json!({ "goal_title": "Dupes", "nodes": [{ "id": 1, "title": "a" }, { "id": 1, "title": "b" }] })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["error"]["code"], "INVALID_GRAPH");

  let (status, body) = request_json(&app, Method::DELETE, "/api/v1/paths/7", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["deleted"], 7);
  let (status, _) = get_json(&app, "/api/v1/paths/7").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn abandoned_session_is_gone() {
  let app = test_app().await;
  let id = open_challenge(&app, 1).await;
  let (status, _) = request_json(&app, Method::DELETE, &format!("/api/v1/challenges/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, body) = get_json(&app, &format!("/api/v1/challenges/{id}")).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"]["code"], "NOT_FOUND");

  // Abandoning never touches progress.
  let (_, progress) = get_json(&app, "/api/v1/paths/1/progress").await;
  assert_eq!(progress["nodes"][0]["attempts_count"], 0);
}

#[tokio::test]
async fn concurrent_hints_on_one_session_are_serialized() {
  let (app, tutor) = gated_app().await;
  let id = open_challenge(&app, 1).await;

  tutor.gate_hints.store(true, Ordering::SeqCst);
  let first_app = app.clone();
  let first = tokio::spawn(async move {
    post_json(&first_app, &format!("/api/v1/challenges/{id}/hint"), json!({ "hint_level": 0 })).await
  });
  tutor.hint_entered.notified().await;

  let second_app = app.clone();
  let second = tokio::spawn(async move {
    post_json(&second_app, &format!("/api/v1/challenges/{id}/hint"), json!({ "hint_level": 0 })).await
  });
  for _ in 0..10 {
    tokio::task::yield_now().await;
  }
  tutor.hint_release.notify_one();

  let (status, body) = first.await.unwrap();
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["hint_level"], 1);

  let (status, body) = second.await.unwrap();
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "INVALID_HINT_LEVEL");

  let (_, session) = get_json(&app, &format!("/api/v1/challenges/{id}")).await;
  assert_eq!(session["hint_level"], 1);
  assert_eq!(session["hints"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn slow_hint_does_not_overwrite_a_passed_submission() {
  let (app, tutor) = gated_app().await;
  let id = open_challenge(&app, 1).await;

  tutor.gate_hints.store(true, Ordering::SeqCst);
  let hint_app = app.clone();
  let hint = tokio::spawn(async move {
    post_json(&hint_app, &format!("/api/v1/challenges/{id}/hint"), json!({ "hint_level": 0 })).await
  });
  tutor.hint_entered.notified().await;

  let submit_app = app.clone();
  let submit = tokio::spawn(async move {
    post_json(&submit_app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": THOROUGH })).await
  });
  for _ in 0..10 {
    tokio::task::yield_now().await;
  }
  tutor.hint_release.notify_one();

  let (status, _) = hint.await.unwrap();
  assert_eq!(status, StatusCode::OK);
  let (status, body) = submit.await.unwrap();
  assert_eq!(status, StatusCode::OK, "submit failed: {body:?}");
  assert_eq!(body["pass_node"], true);

  let (_, session) = get_json(&app, &format!("/api/v1/challenges/{id}")).await;
  assert_eq!(session["state"]["kind"], "evaluated");
  assert_eq!(session["state"]["passed"], true);
  assert_eq!(session["verdict"]["pass_node"], true);
  assert_eq!(session["hint_level"], 1);

  let (status, body) = post_json(&app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": THOROUGH })).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn replaced_path_serves_challenges_for_its_new_nodes() {
  let app = test_app().await;
  let put = |title: &str| json!({ "goal_title": "Brew espresso", "nodes": [{ "id": 1, "title": title }] });

  let (status, _) = request_json(&app, Method::PUT, "/api/v1/paths/7", Some(put("Tamping"))).await;
  assert_eq!(status, StatusCode::OK);
  let (_, first) = request_json(&app, Method::POST, "/api/v1/paths/7/nodes/1/challenge", None).await;
  assert!(first["prompt"].as_str().unwrap().contains("Tamping"));
  let first_id = first["challenge_id"].as_i64().unwrap();

  let (status, _) = request_json(&app, Method::DELETE, "/api/v1/paths/7", None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = get_json(&app, &format!("/api/v1/challenges/{first_id}")).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  request_json(&app, Method::PUT, "/api/v1/paths/7", Some(put("Grind size"))).await;
  let (_, second) = request_json(&app, Method::POST, "/api/v1/paths/7/nodes/1/challenge", None).await;
  assert!(second["prompt"].as_str().unwrap().contains("Grind size"), "stale prompt: {second:?}");
  assert_ne!(second["challenge_id"], first_id);

  // Replacing without a delete also retires the old challenge.
  request_json(&app, Method::PUT, "/api/v1/paths/7", Some(put("Milk texture"))).await;
  let (_, third) = request_json(&app, Method::POST, "/api/v1/paths/7/nodes/1/challenge", None).await;
  assert!(third["prompt"].as_str().unwrap().contains("Milk texture"), "stale prompt: {third:?}");
}

#[tokio::test]
async fn learners_are_kept_apart() {
  let app = test_app().await;
  let (status, opened) = request_as(&app, Some("ana"), Method::POST, "/api/v1/paths/1/nodes/1/challenge", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(opened["learner_id"], "ana");
  let id = opened["challenge_id"].as_i64().unwrap();

  let (status, body) =
    request_as(&app, Some("ana"), Method::POST, &format!("/api/v1/challenges/{id}/submit"), Some(json!({ "answer": THOROUGH }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["pass_node"], true);

  let (_, ana) = request_as(&app, Some("ana"), Method::GET, "/api/v1/paths/1/nodes/2/status", None).await;
  assert_eq!(ana["status"], "not_started");
  let (_, bo) = request_as(&app, Some("bo"), Method::GET, "/api/v1/paths/1/nodes/2/status", None).await;
  assert_eq!(bo["status"], "blocked");

  // Sessions are addressed per learner.
  let (status, _) = request_as(&app, Some("bo"), Method::GET, &format!("/api/v1/challenges/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (_, progress) = get_json(&app, "/api/v1/paths/1/progress?learner=ana").await;
  assert_eq!(progress["nodes"][0]["status"], "completed");
  let (_, progress) = get_json(&app, "/api/v1/paths/1/progress").await;
  assert_eq!(progress["nodes"][0]["status"], "not_started");
  assert_eq!(progress["completion_ratio"], 0.0);
}

#[tokio::test]
async fn passed_session_is_replaced_when_the_node_is_reopened() {
  let app = test_app().await;
  let id = open_challenge(&app, 1).await;
  let (_, body) = post_json(&app, &format!("/api/v1/challenges/{id}/submit"), json!({ "answer": THOROUGH })).await;
  assert_eq!(body["pass_node"], true);

  let fresh = open_challenge(&app, 1).await;
  assert_ne!(fresh, id);
  let (status, _) = get_json(&app, &format!("/api/v1/challenges/{id}")).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (_, session) = get_json(&app, &format!("/api/v1/challenges/{fresh}")).await;
  assert_eq!(session["state"]["kind"], "active");
}
