//! Seed data: a built-in learning path so the service is useful without config.

use crate::config::PathCfg;
use crate::domain::{Edge, Node, NodeType};

pub const SEED_PATH_ID: i64 = 1;

fn node(id: i64, title: &str, description: &str, node_type: NodeType, minutes: u32) -> Node {
  Node {
    id,
    title: title.into(),
    description: description.into(),
    node_type,
    estimated_minutes: Some(minutes),
    tags: vec!["rust".into()],
  }
}

/// "Write safe concurrent Rust": ownership and borrowing lead into lifetimes
/// and threads, which both gate a small capstone project.
pub fn seed_paths() -> Vec<PathCfg> {
  vec![PathCfg {
    id: SEED_PATH_ID,
    goal_title: "Write safe concurrent Rust".into(),
    nodes: vec![
      node(1, "Ownership", "Every value has a single owner; moves transfer it.", NodeType::Concept, 30),
      node(2, "Borrowing", "Shared and mutable references and the aliasing rules.", NodeType::Concept, 30),
      node(3, "Lifetimes", "How the compiler relates reference validity across scopes.", NodeType::Concept, 45),
      node(4, "Threads with Send and Sync", "Spawning threads and sharing state with Arc and Mutex.", NodeType::Skill, 60),
      node(5, "Worker pool", "Build a fixed-size worker pool fed by a channel.", NodeType::Project, 120),
    ],
    edges: vec![
      Edge { from_node_id: 1, to_node_id: 2 },
      Edge { from_node_id: 2, to_node_id: 3 },
      Edge { from_node_id: 2, to_node_id: 4 },
      Edge { from_node_id: 3, to_node_id: 5 },
      Edge { from_node_id: 4, to_node_id: 5 },
    ],
  }]
}
