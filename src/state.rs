//! Application state: catalog, tutor, engine and the HTTP session registry.
//!
//! HTTP callers address sessions by learner and challenge id, so open sessions
//! live in a registry here. Each entry sits behind its own async mutex, held
//! for the whole engine call, so concurrent requests on one session run one at
//! a time against the live value. WebSocket connections keep their session in
//! connection memory instead.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use crate::catalog::InMemoryCatalog;
use crate::collaborators::{PathSource, Tutor};
use crate::config::{load_config_from_env, EngineConfig};
use crate::domain::{ChallengeId, LearnerId, NodeId, PathId};
use crate::engine::PathEngine;
use crate::error::EngineError;
use crate::openai::OpenAI;
use crate::progress::ProgressStore;
use crate::seeds::seed_paths;
use crate::session::{ChallengeSession, SessionState};
use crate::tutor::TutorService;

pub type SharedSession = Arc<Mutex<ChallengeSession>>;

type SessionKey = (LearnerId, ChallengeId);

struct SessionSlot {
  path_id: PathId,
  node_id: NodeId,
  session: SharedSession,
}

#[derive(Clone)]
pub struct AppState {
  pub engine: PathEngine,
  pub catalog: InMemoryCatalog,
  sessions: Arc<RwLock<HashMap<SessionKey, SessionSlot>>>,
}

impl AppState {
  /// Build state from env: load config, seed paths, init OpenAI.
  #[instrument(level = "info", skip_all)]
  pub async fn new() -> Self {
    let cfg = load_config_from_env().unwrap_or_default();

    let openai = OpenAI::from_env();
    if let Some(oa) = &openai {
      info!(target: "skillpath_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
    } else {
      info!(target: "skillpath_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local tutor.");
    }

    Self::from_config(cfg, openai).await
  }

  /// Config paths first, then built-in seeds for any id not already taken.
  pub async fn from_config(cfg: EngineConfig, openai: Option<OpenAI>) -> Self {
    let catalog = InMemoryCatalog::new();
    let mut taken = Vec::new();
    for p in cfg.paths.into_iter().chain(seed_paths()) {
      let id = p.id;
      if taken.contains(&id) { continue; }
      match catalog.load(p).await {
        Ok(g) => {
          info!(target: "catalog", path_id = id, nodes = g.node_count(), edges = g.edges().len(), "Startup path inventory");
          taken.push(id);
        }
        Err(e) => error!(target: "catalog", path_id = id, error = %e, "Skipping invalid path"),
      }
    }

    let tutor = TutorService::new(openai, cfg.prompts, cfg.tutor);
    Self::with_collaborators(catalog, Arc::new(tutor))
  }

  /// Wire an engine over the given catalog and tutor.
  pub fn with_collaborators(catalog: InMemoryCatalog, tutor: Arc<dyn Tutor>) -> Self {
    let source: Arc<dyn PathSource> = Arc::new(catalog.clone());
    Self {
      engine: PathEngine::new(source, tutor, ProgressStore::new()),
      catalog,
      sessions: Arc::new(RwLock::new(HashMap::new())),
    }
  }

  /// Register a freshly opened session and return the live one.
  ///
  /// An unfinished session for the same challenge is kept (hints included), so
  /// reopening is idempotent. Any other session the learner holds on the same
  /// node belongs to a retired challenge and is evicted.
  pub async fn register_session(&self, session: ChallengeSession) -> SharedSession {
    let key = (session.learner().to_string(), session.challenge_id());
    let (path_id, node_id) = (session.path_id(), session.node_id());
    let mut sessions = self.sessions.write().await;

    let before = sessions.len();
    sessions.retain(|(learner, id), slot| {
      !(*learner == key.0 && *id != key.1 && slot.path_id == path_id && slot.node_id == node_id)
    });
    if sessions.len() != before {
      debug!(target: "challenge", learner = %key.0, %path_id, %node_id, evicted = before - sessions.len(), "Evicted sessions of retired challenges");
    }

    if let Some(slot) = sessions.get(&key) {
      // A request holding the lock means the session is in use, so keep it.
      let reusable = match slot.session.try_lock() {
        Ok(existing) => existing.state() != (SessionState::Evaluated { passed: true }),
        Err(_) => true,
      };
      if reusable {
        return slot.session.clone();
      }
    }

    let shared = Arc::new(Mutex::new(session));
    sessions.insert(key, SessionSlot { path_id, node_id, session: shared.clone() });
    shared
  }

  /// The learner's live session for a challenge.
  pub async fn session(&self, learner: &str, challenge_id: ChallengeId) -> Result<SharedSession, EngineError> {
    self
      .sessions
      .read()
      .await
      .get(&(learner.to_string(), challenge_id))
      .map(|slot| slot.session.clone())
      .ok_or(EngineError::ChallengeNotFound(challenge_id))
  }

  /// Abandon a session. Progress is not touched.
  pub async fn drop_session(&self, learner: &str, challenge_id: ChallengeId) -> bool {
    self.sessions.write().await.remove(&(learner.to_string(), challenge_id)).is_some()
  }

  /// Drop every learner's sessions on a path that was deleted or replaced.
  pub async fn drop_path_sessions(&self, path_id: PathId) -> usize {
    let mut sessions = self.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|_, slot| slot.path_id != path_id);
    before - sessions.len()
  }
}
