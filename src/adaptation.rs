//! Path adaptation detection by node-count comparison.
//!
//! Upstream may insert remedial nodes after a weak submission. Detection is a
//! coarse cardinality check: nodes added and removed within the same interval
//! cancel out, so a `false` result is informational only.

use serde::{Deserialize, Serialize};

use crate::domain::PathId;

/// Node count captured when a challenge was opened. The caller carries it
/// across navigation and hands it back; the engine keeps no copy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeCountToken {
  pub path_id: PathId,
  pub node_count: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpansionReport {
  pub path_id: PathId,
  pub node_count_before: usize,
  pub node_count_after: usize,
  pub expanded: bool,
}

/// True iff the path grew.
pub fn check_path_expansion(before: usize, after: usize) -> bool {
  after > before
}

impl ExpansionReport {
  pub fn compare(token: NodeCountToken, node_count_after: usize) -> Self {
    Self {
      path_id: token.path_id,
      node_count_before: token.node_count,
      node_count_after,
      expanded: check_path_expansion(token.node_count, node_count_after),
    }
  }
}
