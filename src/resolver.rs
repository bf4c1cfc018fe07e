//! Lock resolution: (graph, progress) -> effective status per node.
//!
//! Pure functions only. Callers recompute on every read and after every
//! progress write; nothing here caches.

use std::collections::HashMap;

use crate::domain::{EffectiveNodeStatus, NodeId, NodeProgress, ProgressStatus};
use crate::graph::GraphModel;

pub type StatusMap = HashMap<NodeId, EffectiveNodeStatus>;

/// Effective status of every node in `graph`.
pub fn resolve(graph: &GraphModel, progress: &HashMap<NodeId, NodeProgress>) -> StatusMap {
  graph.node_ids().map(|id| (id, resolve_one(graph, progress, id))).collect()
}

/// Effective status of a single node. Unknown ids resolve as `NotStarted`
/// with no prerequisites; callers check membership first.
pub fn resolve_one(graph: &GraphModel, progress: &HashMap<NodeId, NodeProgress>, id: NodeId) -> EffectiveNodeStatus {
  let blocked = graph.prereqs_of(id).iter().any(|p| !is_completed(progress, *p));
  if blocked {
    return EffectiveNodeStatus::Blocked;
  }
  progress.get(&id).map(|np| np.status.into()).unwrap_or(EffectiveNodeStatus::NotStarted)
}

fn is_completed(progress: &HashMap<NodeId, NodeProgress>, id: NodeId) -> bool {
  matches!(progress.get(&id), Some(np) if np.status == ProgressStatus::Completed)
}

/// Nodes blocked in `before` and open in `after`, sorted by id.
pub fn newly_unlocked(before: &StatusMap, after: &StatusMap) -> Vec<NodeId> {
  let mut out: Vec<NodeId> = after
    .iter()
    .filter(|(id, st)| **st != EffectiveNodeStatus::Blocked && before.get(id) == Some(&EffectiveNodeStatus::Blocked))
    .map(|(id, _)| *id)
    .collect();
  out.sort_unstable();
  out
}
