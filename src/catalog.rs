//! In-memory path catalog: the reference `PathSource`.
//!
//! Graphs are stored behind `Arc` and replaced wholesale on every write, so a
//! reader holding an older snapshot never sees a partially updated graph.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::collaborators::PathSource;
use crate::config::PathCfg;
use crate::domain::{Node, NodeId, NodeType, PathId};
use crate::error::EngineError;
use crate::graph::GraphModel;

#[derive(Clone, Debug, Serialize)]
pub struct PathSummary {
  pub path_id: PathId,
  pub goal_title: String,
  pub node_count: usize,
}

/// A node to insert into an existing path; `id` is assigned when omitted.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeDraft {
  #[serde(default)]
  pub id: Option<NodeId>,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub node_type: NodeType,
  #[serde(default)]
  pub estimated_minutes: Option<u32>,
  #[serde(default)]
  pub tags: Vec<String>,
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
  paths: Arc<RwLock<HashMap<PathId, Arc<GraphModel>>>>,
}

impl InMemoryCatalog {
  pub fn new() -> Self { Self::default() }

  /// Build a graph from a config entry and store it.
  pub async fn load(&self, cfg: PathCfg) -> Result<Arc<GraphModel>, EngineError> {
    let graph = GraphModel::new(cfg.id, cfg.goal_title, cfg.nodes, cfg.edges)?;
    Ok(self.put(graph).await)
  }

  /// Insert or wholesale-replace a path.
  #[instrument(level = "info", skip(self, graph), fields(path_id = graph.path_id(), nodes = graph.node_count()))]
  pub async fn put(&self, graph: GraphModel) -> Arc<GraphModel> {
    let graph = Arc::new(graph);
    let replaced = self.paths.write().await.insert(graph.path_id(), graph.clone()).is_some();
    info!(target: "catalog", path_id = graph.path_id(), %replaced, "Path stored");
    graph
  }

  pub async fn remove(&self, path_id: PathId) -> bool {
    self.paths.write().await.remove(&path_id).is_some()
  }

  /// Path summaries sorted by id.
  pub async fn list(&self) -> Vec<PathSummary> {
    let paths = self.paths.read().await;
    let mut out: Vec<PathSummary> = paths
      .values()
      .map(|g| PathSummary { path_id: g.path_id(), goal_title: g.goal_title().to_string(), node_count: g.node_count() })
      .collect();
    out.sort_by_key(|s| s.path_id);
    out
  }

  /// Adaptive insertion: add one node with its prerequisite edges (`prereqs`
  /// point into it, `unlocks` point out of it) and swap in the new graph.
  #[instrument(level = "info", skip(self, draft), fields(title = %draft.title))]
  pub async fn insert_node(
    &self,
    path_id: PathId,
    draft: NodeDraft,
    prereqs: &[NodeId],
    unlocks: &[NodeId],
  ) -> Result<(Node, Arc<GraphModel>), EngineError> {
    let mut paths = self.paths.write().await;
    let current = paths.get(&path_id).ok_or(EngineError::PathNotFound(path_id))?;

    for id in prereqs.iter().chain(unlocks) {
      if !current.contains(*id) {
        return Err(EngineError::NodeNotFound { path_id, node_id: *id });
      }
    }

    let id = draft.id.unwrap_or_else(|| current.node_ids().max().unwrap_or(0) + 1);
    let node = Node {
      id,
      title: draft.title,
      description: draft.description,
      node_type: draft.node_type,
      estimated_minutes: draft.estimated_minutes,
      tags: draft.tags,
    };
    let next = Arc::new(current.with_inserted(node.clone(), prereqs, unlocks)?);
    paths.insert(path_id, next.clone());
    info!(target: "catalog", %path_id, node_id = id, node_count = next.node_count(), "Node inserted into path");
    Ok((node, next))
  }
}

#[async_trait]
impl PathSource for InMemoryCatalog {
  async fn fetch_graph(&self, path_id: PathId) -> Result<Arc<GraphModel>, EngineError> {
    self.paths.read().await.get(&path_id).cloned().ok_or(EngineError::PathNotFound(path_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::{seed_paths, SEED_PATH_ID};

  fn draft(title: &str) -> NodeDraft {
    NodeDraft { id: None, title: title.into(), description: String::new(), node_type: NodeType::Concept, estimated_minutes: None, tags: vec![] }
  }

  #[tokio::test]
  async fn fetch_unknown_path_fails() {
    let c = InMemoryCatalog::new();
    assert!(matches!(c.fetch_graph(3).await, Err(EngineError::PathNotFound(3))));
  }

  #[tokio::test]
  async fn insertion_replaces_snapshot_wholesale() {
    let c = InMemoryCatalog::new();
    for p in seed_paths() {
      c.load(p).await.unwrap();
    }
    let before = c.fetch_graph(SEED_PATH_ID).await.unwrap();
    let (node, after) = c.insert_node(SEED_PATH_ID, draft("Moves vs copies"), &[1], &[2]).await.unwrap();

    assert_eq!(node.id, 6);
    assert_eq!(before.node_count(), 5);
    assert_eq!(after.node_count(), 6);
    assert_eq!(c.fetch_graph(SEED_PATH_ID).await.unwrap().node_count(), 6);
    assert_eq!(c.list().await[0].node_count, 6);
  }

  #[tokio::test]
  async fn insertion_rejects_unknown_endpoints() {
    let c = InMemoryCatalog::new();
    for p in seed_paths() {
      c.load(p).await.unwrap();
    }
    let err = c.insert_node(SEED_PATH_ID, draft("x"), &[42], &[]).await.unwrap_err();
    assert!(matches!(err, EngineError::NodeNotFound { node_id: 42, .. }));
    assert!(matches!(c.insert_node(9, draft("x"), &[], &[]).await, Err(EngineError::PathNotFound(9))));
  }
}
