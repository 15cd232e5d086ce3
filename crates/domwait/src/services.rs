/*!
Service traits consumed by the wait core.

These traits define the contract between the race orchestrator and whatever
provides change notifications, deadlines and element matching.
`Document`, `ThreadTimer` and `ManualTimer` are the in-crate implementations;
anything else (a browser bridge, a test double) plugs in the same way.
*/

use std::sync::Arc;
use std::time::Duration;

use crate::selector::Selector;
use crate::types::{ChangeBatch, NodeId, NodeKind, ObserveOptions, SubscriptionId, TimerId};

/// Callback receiving change batches for one subscription.
pub type BatchCallback = Arc<dyn Fn(ChangeBatch) + Send + Sync>;

/// Callback fired once when a deadline elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Source of structural change notifications.
pub trait ChangeSource {
  /// Start delivering batches of changes on `target` to `callback`.
  ///
  /// Delivery may happen on any thread, but never with a source lock held,
  /// so `callback` is free to call back into the source (e.g. `unsubscribe`).
  fn subscribe(
    &self,
    target: NodeId,
    options: ObserveOptions,
    callback: BatchCallback,
  ) -> SubscriptionId;

  /// Stop delivery. Idempotent: unknown or already released ids are ignored.
  fn unsubscribe(&self, id: SubscriptionId);
}

/// One-shot deadline timers.
pub trait DeadlineTimer {
  /// Fire `callback` once after `duration` unless disarmed first.
  fn arm(&self, duration: Duration, callback: TimerCallback) -> TimerId;

  /// Cancel a timer. Idempotent: fired, disarmed or unknown ids are ignored.
  fn disarm(&self, id: TimerId);
}

/// Read access to the tree the change source reports on.
pub trait NodeTree {
  /// Kind of `node`, or `None` if it does not exist.
  fn kind(&self, node: NodeId) -> Option<NodeKind>;

  /// Whether `node` matches `selector`.
  fn matches(&self, node: NodeId, selector: &Selector) -> bool;

  /// Descendants of `node` (excluding `node`) matching `selector`, in document order.
  fn query_descendants(&self, node: NodeId, selector: &Selector) -> Vec<NodeId>;
}
