/*! Per-call wait configuration. */

use std::time::Duration;

use crate::selector::Selector;
use crate::types::{NodeId, ObserveOptions};

/// Immutable configuration of one wait.
///
/// # Example
///
/// ```
/// use domwait::{NodeId, ObserveOptions, WaitRequest};
///
/// let request = WaitRequest::new(NodeId(1), || false)
///   .query("div.card".parse()?)
///   .options(ObserveOptions::subtree())
///   .timeout_ms(500);
/// # Ok::<(), domwait::SelectorError>(())
/// ```
#[must_use = "WaitRequest does nothing until passed to wait()"]
pub struct WaitRequest<F> {
  pub(crate) trigger: F,
  pub(crate) target: NodeId,
  pub(crate) query: Option<Selector>,
  pub(crate) options: ObserveOptions,
  pub(crate) timeout: Option<Duration>,
}

impl<F> std::fmt::Debug for WaitRequest<F> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WaitRequest")
      .field("target", &self.target)
      .field("query", &self.query.as_ref().map(Selector::as_str))
      .field("options", &self.options)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

impl WaitRequest<fn() -> bool> {
  /// Request with a trigger that never short-circuits.
  pub fn passive(target: NodeId) -> Self {
    fn never() -> bool {
      false
    }
    Self::new(target, never)
  }
}

impl<F: FnOnce() -> bool> WaitRequest<F> {
  /// Watch `target`; `trigger` runs once after setup and settles the wait
  /// with no elements if it returns true.
  pub fn new(target: NodeId, trigger: F) -> Self {
    Self {
      trigger,
      target,
      query: None,
      options: ObserveOptions::default(),
      timeout: None,
    }
  }

  /// Only elements matching `selector` settle the wait. Default: `*`.
  pub fn query(mut self, selector: Selector) -> Self {
    self.query = Some(selector);
    self
  }

  /// What to observe on `target`. Default: child list, no subtree.
  pub fn options(mut self, options: ObserveOptions) -> Self {
    self.options = options;
    self
  }

  /// Fail with `TimedOut` if nothing settles the wait within `timeout`.
  ///
  /// A zero duration arms no timer, same as leaving the timeout unset.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Convenience for `timeout(Duration::from_millis(ms))`.
  pub fn timeout_ms(self, ms: u64) -> Self {
    self.timeout(Duration::from_millis(ms))
  }

  /// The deadline that will actually be armed, if any.
  pub(crate) fn deadline(&self) -> Option<Duration> {
    self.timeout.filter(|d| !d.is_zero())
  }
}
