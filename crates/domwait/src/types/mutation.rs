/*! Change-notification data: node kinds, mutation records, batches and observe options. */

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::NodeId;

/// Kind of a node in an observed tree. Only `Element` nodes can match a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum NodeKind {
  Document,
  Element,
  Text,
  Comment,
}

impl NodeKind {
  /// Whether nodes of this kind take part in selector matching.
  #[inline]
  pub const fn is_element(self) -> bool {
    matches!(self, NodeKind::Element)
  }
}

/// What a mutation record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum MutationKind {
  ChildList,
  Attributes,
  CharacterData,
}

/// A single structural or attribute change on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MutationRecord {
  pub kind: MutationKind,
  pub target: NodeId,
  /// Nodes inserted under `target`, in insertion order.
  pub added: Vec<NodeId>,
  pub removed: Vec<NodeId>,
  /// Changed attribute name. Only set for `Attributes` records.
  pub attribute_name: Option<String>,
}

impl MutationRecord {
  /// Record for `added` nodes inserted under `target`.
  pub fn added(target: NodeId, added: Vec<NodeId>) -> Self {
    Self {
      kind: MutationKind::ChildList,
      target,
      added,
      removed: Vec::new(),
      attribute_name: None,
    }
  }

  /// Record for `removed` nodes taken out of `target`.
  pub fn removed(target: NodeId, removed: Vec<NodeId>) -> Self {
    Self {
      kind: MutationKind::ChildList,
      target,
      added: Vec::new(),
      removed,
      attribute_name: None,
    }
  }

  /// Record for a changed attribute on `target`.
  pub fn attribute(target: NodeId, name: impl Into<String>) -> Self {
    Self {
      kind: MutationKind::Attributes,
      target,
      added: Vec::new(),
      removed: Vec::new(),
      attribute_name: Some(name.into()),
    }
  }

  /// Record for changed text content of `target`.
  pub fn character_data(target: NodeId) -> Self {
    Self {
      kind: MutationKind::CharacterData,
      target,
      added: Vec::new(),
      removed: Vec::new(),
      attribute_name: None,
    }
  }
}

/// Records delivered together to one subscriber, in the order they happened.
pub type ChangeBatch = Vec<MutationRecord>;

/// Which changes a subscription is interested in.
///
/// Default: child list changes on the target only (`childList: true`, everything else off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[allow(clippy::struct_excessive_bools)]
pub struct ObserveOptions {
  pub attributes: bool,
  pub child_list: bool,
  /// Also observe all descendants of the target, not just the target itself.
  pub subtree: bool,
  pub character_data: bool,
}

impl Default for ObserveOptions {
  fn default() -> Self {
    Self {
      attributes: false,
      child_list: true,
      subtree: false,
      character_data: false,
    }
  }
}

impl ObserveOptions {
  /// Watch child list changes anywhere under the target.
  pub const fn subtree() -> Self {
    Self {
      attributes: false,
      child_list: true,
      subtree: true,
      character_data: false,
    }
  }

  #[must_use]
  pub const fn with_attributes(mut self, on: bool) -> Self {
    self.attributes = on;
    self
  }

  #[must_use]
  pub const fn with_child_list(mut self, on: bool) -> Self {
    self.child_list = on;
    self
  }

  #[must_use]
  pub const fn with_subtree(mut self, on: bool) -> Self {
    self.subtree = on;
    self
  }

  #[must_use]
  pub const fn with_character_data(mut self, on: bool) -> Self {
    self.character_data = on;
    self
  }

  /// Whether a record of `kind` is wanted under these options.
  pub const fn wants(&self, kind: MutationKind) -> bool {
    match kind {
      MutationKind::ChildList => self.child_list,
      MutationKind::Attributes => self.attributes,
      MutationKind::CharacterData => self.character_data,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_observes_child_list_only() {
    let opts = ObserveOptions::default();
    assert!(opts.wants(MutationKind::ChildList));
    assert!(!opts.wants(MutationKind::Attributes));
    assert!(!opts.wants(MutationKind::CharacterData));
    assert!(!opts.subtree);
  }

  #[test]
  fn builder_toggles_flags() {
    let opts = ObserveOptions::subtree()
      .with_attributes(true)
      .with_child_list(false);
    assert!(opts.subtree);
    assert!(opts.wants(MutationKind::Attributes));
    assert!(!opts.wants(MutationKind::ChildList));
  }

  #[test]
  fn options_serialize_camel_case() {
    let json = serde_json::to_value(ObserveOptions::default()).unwrap();
    assert_eq!(json["childList"], true);
    assert_eq!(json["characterData"], false);
  }
}
