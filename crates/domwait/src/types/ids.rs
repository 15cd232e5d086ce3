/*! Branded ID types for type-safe references to nodes, subscriptions and timers. */

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use ts_rs::TS;

/// Node identifier. Opaque handle to a node in a watched tree.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct NodeId(pub u32);

/// Global counter for `NodeId` generation. Starts at 1 (0 could be confused with "null").
static NODE_COUNTER: AtomicU32 = AtomicU32::new(1);

impl NodeId {
  /// Generate a new unique `NodeId`.
  pub fn new() -> Self {
    Self(NODE_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for NodeId {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle to a change-notification subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
pub struct SubscriptionId(pub u64);

static SUBSCRIPTION_COUNTER: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
  /// Generate a new unique `SubscriptionId`. Ids increase in creation order.
  pub fn new() -> Self {
    Self(SUBSCRIPTION_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for SubscriptionId {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle to an armed deadline timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
pub struct TimerId(pub u64);

static TIMER_COUNTER: AtomicU64 = AtomicU64::new(1);

impl TimerId {
  /// Generate a new unique `TimerId`.
  pub fn new() -> Self {
    Self(TIMER_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for TimerId {
  fn default() -> Self {
    Self::new()
  }
}
