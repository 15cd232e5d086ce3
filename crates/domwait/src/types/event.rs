/*! Events broadcast by a `Document` as its tree changes. */

use serde::Serialize;
use ts_rs::TS;

use super::{MutationRecord, NodeId};

/// Events emitted when document state changes.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "event", content = "data")]
#[ts(export)]
pub enum Event {
  // Node lifecycle
  #[serde(rename = "node:created")]
  NodeCreated { node_id: NodeId },

  // Every mutation record, in the order it was queued for observers
  #[serde(rename = "tree:mutated")]
  Mutated(MutationRecord),

  // Delivery checkpoint
  #[serde(rename = "mutations:delivered")]
  MutationsDelivered { batches: usize },
}
