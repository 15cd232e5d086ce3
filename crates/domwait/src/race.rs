/*!
Single-shot race between a trigger, change notifications and a deadline.

# Lifecycle

```text
SettingUp ──trigger true──────────────▶ Settled (Ok([]))
    │
    └─setup done──▶ Pending ──matching batch──▶ Settled (Ok(elements))
                       │
                       └──deadline─────────────▶ Settled (Err(TimedOut))
```

Setup runs in a fixed order: subscribe, arm the timer, invoke the trigger.
Batches or deadlines that arrive while setup is still running are queued and
replayed in arrival order once the trigger has had its chance, so they can
never beat it. Anything arriving during the replay joins the back of the queue.

Settlement happens exactly once, guarded by the phase under the state lock.
The settling path takes both handles, releases them with no lock held, and
only then publishes the outcome and wakes the awaiting task. Later events see
`Settled` and return without effect.

Callbacks hold a `Weak` reference to the race. Dropping a pending [`Wait`]
settles it silently and releases its subscription and timer.
*/

use derive_more::Display;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::extract::{search_batch, MatchResult};
use crate::request::WaitRequest;
use crate::selector::Selector;
use crate::services::{ChangeSource, DeadlineTimer, NodeTree};
use crate::types::{ChangeBatch, NodeId, SubscriptionId, TimerId, WaitError, WaitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  SettingUp,
  Pending,
  Settled,
}

/// Which completion source settled the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
enum Transition {
  #[display("trigger")]
  Trigger,
  #[display("notification")]
  Notification,
  #[display("timeout")]
  Timeout,
  #[display("drop")]
  Cancelled,
}

/// Event that arrived before setup finished.
enum Deferred {
  Batch(ChangeBatch),
  Timeout(Duration),
}

struct RaceState {
  phase: Phase,
  subscription: Option<SubscriptionId>,
  timer: Option<TimerId>,
  deferred: VecDeque<Deferred>,
  /// Published only after both handles are released.
  outcome: Option<WaitResult<Vec<NodeId>>>,
  waker: Option<Waker>,
}

struct Race<S, T> {
  source: S,
  timer: T,
  target: NodeId,
  query: Selector,
  state: Mutex<RaceState>,
}

impl<S, T> Race<S, T>
where
  S: ChangeSource + NodeTree,
  T: DeadlineTimer,
{
  fn on_batch(&self, batch: ChangeBatch) {
    {
      let mut state = self.state.lock();
      match state.phase {
        Phase::Settled => return,
        Phase::SettingUp => {
          state.deferred.push_back(Deferred::Batch(batch));
          return;
        }
        Phase::Pending => {}
      }
    }
    self.process_batch(&batch);
  }

  fn on_timeout(&self, after: Duration) {
    {
      let mut state = self.state.lock();
      match state.phase {
        Phase::Settled => return,
        Phase::SettingUp => {
          state.deferred.push_back(Deferred::Timeout(after));
          return;
        }
        Phase::Pending => {}
      }
    }
    self.settle(Some(Err(WaitError::TimedOut { after })), Transition::Timeout);
  }

  fn process_batch(&self, batch: &ChangeBatch) {
    // Extraction reads the tree; run it without our lock
    match search_batch(&self.source, batch, &self.query) {
      MatchResult::NoMatch => {
        log::trace!(
          "Batch of {} record(s) on {} has no '{}' elements",
          batch.len(),
          self.target,
          self.query
        );
      }
      MatchResult::Matches(found) => {
        self.settle(Some(Ok(found)), Transition::Notification);
      }
    }
  }

  /// Replay anything that arrived during setup, then leave `SettingUp`.
  ///
  /// Events arriving during the replay are queued behind it, so the phase
  /// flips to `Pending` only once the queue is empty under the lock.
  fn finish_setup(&self) {
    loop {
      let event = {
        let mut state = self.state.lock();
        if state.phase != Phase::SettingUp {
          return;
        }
        match state.deferred.pop_front() {
          Some(event) => event,
          None => {
            state.phase = Phase::Pending;
            return;
          }
        }
      };

      match event {
        Deferred::Batch(batch) => self.process_batch(&batch),
        Deferred::Timeout(after) => {
          self.settle(Some(Err(WaitError::TimedOut { after })), Transition::Timeout);
        }
      }
    }
  }

  /// Settle once. Returns false if already settled.
  ///
  /// `outcome` is `None` only for cancellation, which publishes nothing.
  fn settle(&self, outcome: Option<WaitResult<Vec<NodeId>>>, transition: Transition) -> bool {
    // Step 1: claim settlement and take handles (quick lock)
    let (subscription, timer) = {
      let mut state = self.state.lock();
      if state.phase == Phase::Settled {
        return false;
      }
      state.phase = Phase::Settled;
      state.deferred.clear();
      (state.subscription.take(), state.timer.take())
    };

    // Step 2: release handles (NO LOCK)
    if let Some(id) = subscription {
      self.source.unsubscribe(id);
    }
    if let Some(id) = timer {
      // A fired timer needs no disarming
      if transition != Transition::Timeout {
        self.timer.disarm(id);
      }
    }

    match &outcome {
      Some(Ok(found)) => log::debug!(
        "Wait on {} settled by {transition} with {} element(s)",
        self.target,
        found.len()
      ),
      Some(Err(e)) => log::debug!("Wait on {} settled by {transition}: {e}", self.target),
      None => log::debug!("Wait on {} settled by {transition}", self.target),
    }

    // Step 3: publish and wake
    let waker = {
      let mut state = self.state.lock();
      state.outcome = outcome;
      state.waker.take()
    };
    if let Some(waker) = waker {
      waker.wake();
    }
    true
  }
}

/// Future returned by [`wait`]. Resolves once; dropping it while pending
/// releases the subscription and timer.
#[must_use = "futures do nothing unless awaited; dropping a Wait cancels it"]
pub struct Wait<S, T>
where
  S: ChangeSource + NodeTree,
  T: DeadlineTimer,
{
  race: Arc<Race<S, T>>,
}

impl<S, T> std::fmt::Debug for Wait<S, T>
where
  S: ChangeSource + NodeTree,
  T: DeadlineTimer,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.race.state.lock();
    f.debug_struct("Wait")
      .field("target", &self.race.target)
      .field("query", &self.race.query.as_str())
      .field("phase", &state.phase)
      .finish_non_exhaustive()
  }
}

impl<S, T> Wait<S, T>
where
  S: ChangeSource + NodeTree,
  T: DeadlineTimer,
{
  /// Whether a completion source has already won.
  pub fn is_settled(&self) -> bool {
    self.race.state.lock().phase == Phase::Settled
  }

  /// The outcome, if published. Does not consume it.
  pub fn outcome(&self) -> Option<WaitResult<Vec<NodeId>>> {
    self.race.state.lock().outcome.clone()
  }
}

impl<S, T> Future for Wait<S, T>
where
  S: ChangeSource + NodeTree,
  T: DeadlineTimer,
{
  type Output = WaitResult<Vec<NodeId>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut state = self.race.state.lock();
    if let Some(outcome) = &state.outcome {
      return Poll::Ready(outcome.clone());
    }
    match &state.waker {
      Some(w) if w.will_wake(cx.waker()) => {}
      _ => state.waker = Some(cx.waker().clone()),
    }
    Poll::Pending
  }
}

impl<S, T> Drop for Wait<S, T>
where
  S: ChangeSource + NodeTree,
  T: DeadlineTimer,
{
  fn drop(&mut self) {
    self.race.settle(None, Transition::Cancelled);
  }
}

/// Wait for elements matching the request's query to be added under its target.
///
/// Subscribes to `source`, arms `timer` if the request has a non-zero timeout,
/// then runs the trigger before returning. The returned future resolves with:
///
/// - `Ok(vec![])` if the trigger returned true (already settled on return),
/// - `Ok(elements)` for the first batch whose added nodes contain matches,
/// - `Err(WaitError::TimedOut)` if the deadline passes first.
///
/// Batches with no matching elements never settle the wait, whatever the query.
pub fn wait<F, S, T>(request: WaitRequest<F>, source: &S, timer: &T) -> Wait<S, T>
where
  F: FnOnce() -> bool,
  S: ChangeSource + NodeTree + Clone + Send + Sync + 'static,
  T: DeadlineTimer + Clone + Send + Sync + 'static,
{
  let deadline = request.deadline();
  let WaitRequest {
    trigger,
    target,
    query,
    options,
    ..
  } = request;

  let race = Arc::new(Race {
    source: source.clone(),
    timer: timer.clone(),
    target,
    query: query.unwrap_or_default(),
    state: Mutex::new(RaceState {
      phase: Phase::SettingUp,
      subscription: None,
      timer: None,
      deferred: VecDeque::new(),
      outcome: None,
      waker: None,
    }),
  });

  // Owned from here on, so an unwinding trigger still releases everything
  let wait = Wait {
    race: Arc::clone(&race),
  };

  let weak: Weak<Race<S, T>> = Arc::downgrade(&race);
  let subscription = source.subscribe(
    target,
    options,
    Arc::new(move |batch: ChangeBatch| {
      if let Some(race) = weak.upgrade() {
        race.on_batch(batch);
      }
    }),
  );
  race.state.lock().subscription = Some(subscription);

  if let Some(after) = deadline {
    let weak = Arc::downgrade(&race);
    let id = timer.arm(
      after,
      Box::new(move || {
        if let Some(race) = weak.upgrade() {
          race.on_timeout(after);
        }
      }),
    );
    race.state.lock().timer = Some(id);
  }

  log::debug!(
    "Waiting for '{}' under {target} (timeout: {deadline:?})",
    race.query
  );

  if trigger() {
    race.settle(Some(Ok(Vec::new())), Transition::Trigger);
  }
  race.finish_setup();

  wait
}
