//! Immutable per-fetch view of one path's nodes and prerequisite edges.
//!
//! A `GraphModel` is built once from a catalog fetch and shared behind `Arc`.
//! Newer fetches replace it wholesale; nothing patches a model in place.
//! Traversals visit each node at most once, so a cyclic edge set (which
//! upstream should never produce) cannot hang the engine.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::{Edge, Node, NodeId, PathId};
use crate::error::EngineError;

#[derive(Clone, Debug)]
pub struct GraphModel {
  path_id: PathId,
  goal_title: String,
  nodes: HashMap<NodeId, Node>,
  edges: Vec<Edge>,
  prereqs: HashMap<NodeId, Vec<NodeId>>,
  dependents: HashMap<NodeId, Vec<NodeId>>,
  dangling: Vec<Edge>,
}

/// Serializable snapshot of a graph, nodes sorted by id.
#[derive(Clone, Debug, Serialize)]
pub struct GraphSnapshot {
  pub path_id: PathId,
  pub goal_title: String,
  pub nodes: Vec<Node>,
  pub edges: Vec<Edge>,
}

impl GraphModel {
  /// Build a model. Duplicate node ids are rejected; edges whose endpoints are
  /// unknown are kept aside as dangling and ignored by every query.
  pub fn new(path_id: PathId, goal_title: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, EngineError> {
    let mut by_id = HashMap::with_capacity(nodes.len());
    for n in nodes {
      let id = n.id;
      if by_id.insert(id, n).is_some() {
        return Err(EngineError::InvalidGraph(format!("duplicate node id {id} in path {path_id}")));
      }
    }

    let mut prereqs: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut dangling = Vec::new();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(edges.len());

    for e in edges {
      if !by_id.contains_key(&e.from_node_id) || !by_id.contains_key(&e.to_node_id) {
        dangling.push(e);
        continue;
      }
      if !seen.insert(e) { continue; }
      prereqs.entry(e.to_node_id).or_default().push(e.from_node_id);
      dependents.entry(e.from_node_id).or_default().push(e.to_node_id);
      kept.push(e);
    }

    Ok(Self {
      path_id,
      goal_title: goal_title.into(),
      nodes: by_id,
      edges: kept,
      prereqs,
      dependents,
      dangling,
    })
  }

  pub fn path_id(&self) -> PathId { self.path_id }

  pub fn goal_title(&self) -> &str { &self.goal_title }

  pub fn node_count(&self) -> usize { self.nodes.len() }

  pub fn node(&self, id: NodeId) -> Option<&Node> { self.nodes.get(&id) }

  pub fn contains(&self, id: NodeId) -> bool { self.nodes.contains_key(&id) }

  pub fn nodes(&self) -> impl Iterator<Item = &Node> { self.nodes.values() }

  pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ { self.nodes.keys().copied() }

  /// Edges whose endpoints both exist, deduplicated.
  pub fn edges(&self) -> &[Edge] { &self.edges }

  /// Edges that referenced unknown node ids at construction time.
  pub fn dangling_edges(&self) -> &[Edge] { &self.dangling }

  /// Direct prerequisites of `id` (empty for roots and unknown ids).
  pub fn prereqs_of(&self, id: NodeId) -> &[NodeId] {
    self.prereqs.get(&id).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Nodes that list `id` as a direct prerequisite.
  pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
    self.dependents.get(&id).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Nodes without prerequisites, sorted by id.
  pub fn roots(&self) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = self.node_ids().filter(|id| self.prereqs_of(*id).is_empty()).collect();
    out.sort_unstable();
    out
  }

  /// Kahn ordering with smallest-id tie breaking. Nodes caught in a cycle are
  /// never released and are returned separately instead of looping.
  pub fn topological_order(&self) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut indegree: HashMap<NodeId, usize> = self.node_ids().map(|id| (id, self.prereqs_of(id).len())).collect();
    let mut ready: Vec<NodeId> = indegree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
    ready.sort_unstable_by(|a, b| b.cmp(a));

    let mut order = Vec::with_capacity(self.nodes.len());
    while let Some(id) = ready.pop() {
      order.push(id);
      for dep in self.dependents_of(id) {
        if let Some(d) = indegree.get_mut(dep) {
          *d -= 1;
          if *d == 0 {
            ready.push(*dep);
            ready.sort_unstable_by(|a, b| b.cmp(a));
          }
        }
      }
    }

    let placed: HashSet<NodeId> = order.iter().copied().collect();
    let mut cyclic: Vec<NodeId> = self.node_ids().filter(|id| !placed.contains(id)).collect();
    cyclic.sort_unstable();
    (order, cyclic)
  }

  /// Copy with one node added, used by adaptive insertion. The original model
  /// is left untouched.
  pub fn with_inserted(&self, node: Node, prereqs: &[NodeId], unlocks: &[NodeId]) -> Result<Self, EngineError> {
    if self.contains(node.id) {
      return Err(EngineError::InvalidGraph(format!("node {} already exists in path {}", node.id, self.path_id)));
    }
    let id = node.id;
    let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
    nodes.push(node);
    let mut edges = self.edges.clone();
    edges.extend(prereqs.iter().map(|p| Edge { from_node_id: *p, to_node_id: id }));
    edges.extend(unlocks.iter().map(|u| Edge { from_node_id: id, to_node_id: *u }));
    GraphModel::new(self.path_id, self.goal_title.clone(), nodes, edges)
  }

  pub fn snapshot(&self) -> GraphSnapshot {
    let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
    nodes.sort_by_key(|n| n.id);
    let mut edges = self.edges.clone();
    edges.sort_by_key(|e| (e.from_node_id, e.to_node_id));
    GraphSnapshot { path_id: self.path_id, goal_title: self.goal_title.clone(), nodes, edges }
  }
}
