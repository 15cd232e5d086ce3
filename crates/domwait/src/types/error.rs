/*! Error types for waits, selectors and the document tree. */

use std::time::Duration;

use super::NodeId;

/// The single way a wait can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
  #[error("Timed out observing mutation (after {}ms)", .after.as_millis())]
  TimedOut { after: Duration },
}

/// Result type for waits.
pub type WaitResult<T> = Result<T, WaitError>;

/// Errors produced while parsing a selector string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
  #[error("Empty selector")]
  Empty,

  #[error("Unexpected character '{found}' at offset {offset}")]
  UnexpectedChar { found: char, offset: usize },

  #[error("Unexpected end of selector at offset {offset}")]
  UnexpectedEnd { offset: usize },

  #[error("Unsupported selector syntax '{syntax}' at offset {offset}")]
  Unsupported { syntax: String, offset: usize },
}

/// Result type for selector parsing.
pub type SelectorResult<T> = Result<T, SelectorError>;

/// Errors that can occur while editing a `Document`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
  #[error("Node not found: {0}")]
  NodeNotFound(NodeId),

  #[error("Node {child} is not a child of {parent}")]
  NotAChild { parent: NodeId, child: NodeId },

  #[error("Node {0} already has a parent; remove it first")]
  AlreadyAttached(NodeId),

  #[error("Inserting {child} under {parent} would create a cycle or an invalid hierarchy")]
  HierarchyRequest { parent: NodeId, child: NodeId },

  #[error("Node {0} is not an element")]
  NotAnElement(NodeId),

  #[error("Node {0} has no text content")]
  NotCharacterData(NodeId),
}

/// Result type for `Document` operations.
pub type DomResult<T> = Result<T, DomError>;
