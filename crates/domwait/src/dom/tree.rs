/*!
Tree relationship management.

Single source of truth for parent-child relationships in a `Document`.
All mutations go through methods that maintain bidirectional link invariants.

## Invariants

1. **Single parent**: each attached node has exactly ONE parent.
2. **Bidirectional consistency**: if `parent_of[child] = parent`, then
   `children_of[parent]` contains `child`, and vice versa.
3. **No implicit reparenting**: a node must be detached before it can be
   inserted elsewhere. Callers check this before linking.
*/

use crate::types::NodeId;
use std::collections::HashMap;

pub(super) struct TreeLinks {
  parent_of: HashMap<NodeId, NodeId>,
  children_of: HashMap<NodeId, Vec<NodeId>>,
}

impl TreeLinks {
  pub(super) fn new() -> Self {
    Self {
      parent_of: HashMap::new(),
      children_of: HashMap::new(),
    }
  }

  /// Get parent of a node.
  pub(super) fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.parent_of.get(&id).copied()
  }

  /// Get children of a node (empty slice if none).
  pub(super) fn children(&self, id: NodeId) -> &[NodeId] {
    self.children_of.get(&id).map_or(&[], Vec::as_slice)
  }

  /// Whether `ancestor` is `node` or one of its ancestors.
  pub(super) fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
      if id == ancestor {
        return true;
      }
      current = self.parent(id);
    }
    false
  }

  /// Link `child` under `parent`, before `before` if given, else at the end.
  ///
  /// The child must be unparented. A child that already has a parent is a bug
  /// in the caller; it is logged and ignored.
  pub(super) fn insert(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
    if let Some(&existing_parent) = self.parent_of.get(&child) {
      log::error!(
        "insert: node {child} already has parent {existing_parent}, \
         cannot insert under {parent}. This is a bug - detach was skipped."
      );
      return;
    }

    self.parent_of.insert(child, parent);
    let siblings = self.children_of.entry(parent).or_default();
    let index = before
      .and_then(|b| siblings.iter().position(|&s| s == b))
      .unwrap_or(siblings.len());
    siblings.insert(index, child);
  }

  /// Unlink `child` from its parent. Its own subtree stays intact.
  /// Returns the former parent.
  pub(super) fn detach(&mut self, child: NodeId) -> Option<NodeId> {
    let parent = self.parent_of.remove(&child)?;
    if let Some(siblings) = self.children_of.get_mut(&parent) {
      siblings.retain(|&s| s != child);
    }
    Some(parent)
  }

  /// Descendants of `root` (excluding `root`) in document (pre-)order.
  /// Iterative to avoid stack overflow on deep trees.
  pub(super) fn descendants(&self, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
      out.push(id);
      stack.extend(self.children(id).iter().rev().copied());
    }

    out
  }
}
