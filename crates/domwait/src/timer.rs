/*!
Deadline timer services.

- `ThreadTimer`: one background thread sleeping until the next deadline.
  Stops when the last clone is dropped.
- `ManualTimer`: virtual clock that only moves when `advance` is called.
  Deterministic, for tests and simulations.

Both fire callbacks with no internal lock held, so a callback may arm or
disarm timers.
*/

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::services::{DeadlineTimer, TimerCallback};
use crate::types::TimerId;

/// Armed callbacks ordered by deadline, ties broken by arm order.
struct Schedule<T> {
  by_deadline: BTreeMap<(T, TimerId), TimerCallback>,
  deadlines: HashMap<TimerId, T>,
  /// Deadlines past the end of the clock. Held until disarmed, never fired.
  unreachable: HashMap<TimerId, TimerCallback>,
}

impl<T: Ord + Copy> Schedule<T> {
  fn new() -> Self {
    Self {
      by_deadline: BTreeMap::new(),
      deadlines: HashMap::new(),
      unreachable: HashMap::new(),
    }
  }

  /// Schedule `callback` at `at`, or never if the deadline overflowed.
  fn insert(&mut self, at: Option<T>, callback: TimerCallback) -> TimerId {
    let id = TimerId::new();
    match at {
      Some(at) => {
        self.by_deadline.insert((at, id), callback);
        self.deadlines.insert(id, at);
      }
      None => {
        self.unreachable.insert(id, callback);
      }
    }
    id
  }

  fn remove(&mut self, id: TimerId) -> bool {
    match self.deadlines.remove(&id) {
      Some(at) => self.by_deadline.remove(&(at, id)).is_some(),
      None => self.unreachable.remove(&id).is_some(),
    }
  }

  fn next_deadline(&self) -> Option<T> {
    self.by_deadline.keys().next().map(|&(at, _)| at)
  }

  /// Remove and return the earliest entry due at or before `now`.
  fn pop_due(&mut self, now: T) -> Option<(T, TimerCallback)> {
    let &(at, id) = self.by_deadline.keys().next()?;
    if at > now {
      return None;
    }
    self.deadlines.remove(&id);
    self.by_deadline.remove(&(at, id)).map(|cb| (at, cb))
  }

  fn contains(&self, id: TimerId) -> bool {
    self.deadlines.contains_key(&id) || self.unreachable.contains_key(&id)
  }

  fn len(&self) -> usize {
    self.deadlines.len() + self.unreachable.len()
  }
}

// ---- ThreadTimer ----

struct ThreadState {
  schedule: Schedule<Instant>,
  stopped: bool,
}

struct ThreadShared {
  state: Mutex<ThreadState>,
  wakeup: Condvar,
}

/// Owns the timer thread. Stops and joins on drop.
struct TimerThreadHandle {
  shared: Arc<ThreadShared>,
  thread: Option<JoinHandle<()>>,
}

impl Drop for TimerThreadHandle {
  fn drop(&mut self) {
    self.shared.state.lock().stopped = true;
    self.shared.wakeup.notify_all();
    if let Some(t) = self.thread.take() {
      // The last clone can be released from inside a callback; never join ourselves.
      if t.thread().id() != thread::current().id() {
        drop(t.join());
      }
    }
  }
}

/// Wall-clock timer backed by a single background thread.
///
/// Clone is cheap - all clones share one thread.
#[derive(Clone)]
pub struct ThreadTimer {
  shared: Arc<ThreadShared>,
  _thread: Arc<TimerThreadHandle>,
}

impl std::fmt::Debug for ThreadTimer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ThreadTimer")
      .field("armed", &self.armed_count())
      .finish_non_exhaustive()
  }
}

impl Default for ThreadTimer {
  fn default() -> Self {
    Self::new()
  }
}

impl ThreadTimer {
  /// Start the timer thread.
  pub fn new() -> Self {
    let shared = Arc::new(ThreadShared {
      state: Mutex::new(ThreadState {
        schedule: Schedule::new(),
        stopped: false,
      }),
      wakeup: Condvar::new(),
    });

    let shared_clone = Arc::clone(&shared);
    let thread = thread::spawn(move || timer_loop(&shared_clone));

    Self {
      _thread: Arc::new(TimerThreadHandle {
        shared: Arc::clone(&shared),
        thread: Some(thread),
      }),
      shared,
    }
  }

  /// Number of timers armed and not yet fired.
  pub fn armed_count(&self) -> usize {
    self.shared.state.lock().schedule.len()
  }
}

/// Sleep until the next deadline, fire everything due, repeat until stopped.
fn timer_loop(shared: &ThreadShared) {
  let mut state = shared.state.lock();
  loop {
    if state.stopped {
      break;
    }

    let now = Instant::now();
    if let Some((_, callback)) = state.schedule.pop_due(now) {
      MutexGuard::unlocked(&mut state, callback);
      continue;
    }

    match state.schedule.next_deadline() {
      Some(deadline) => {
        shared.wakeup.wait_until(&mut state, deadline);
      }
      None => shared.wakeup.wait(&mut state),
    }
  }
}

impl DeadlineTimer for ThreadTimer {
  fn arm(&self, duration: Duration, callback: TimerCallback) -> TimerId {
    let deadline = Instant::now().checked_add(duration);
    let id = self.shared.state.lock().schedule.insert(deadline, callback);
    if deadline.is_some() {
      self.shared.wakeup.notify_all();
      log::trace!("Timer {id} armed for {}ms", duration.as_millis());
    } else {
      log::trace!("Timer {id} armed beyond the end of the clock; it will never fire");
    }
    id
  }

  fn disarm(&self, id: TimerId) {
    if self.shared.state.lock().schedule.remove(id) {
      log::trace!("Timer {id} disarmed");
    }
  }
}

// ---- ManualTimer ----

struct ManualState {
  now: Duration,
  schedule: Schedule<Duration>,
}

/// Virtual-clock timer. Time starts at zero and moves only via `advance`.
#[derive(Clone)]
pub struct ManualTimer {
  state: Arc<Mutex<ManualState>>,
}

impl std::fmt::Debug for ManualTimer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("ManualTimer")
      .field("now", &state.now)
      .field("armed", &state.schedule.len())
      .finish()
  }
}

impl Default for ManualTimer {
  fn default() -> Self {
    Self::new()
  }
}

impl ManualTimer {
  /// Clock at zero with nothing armed.
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(ManualState {
        now: Duration::ZERO,
        schedule: Schedule::new(),
      })),
    }
  }

  /// Virtual time elapsed since creation.
  pub fn now(&self) -> Duration {
    self.state.lock().now
  }

  /// Move time forward by `by`, firing due callbacks in deadline order.
  /// The clock reads each callback's deadline while it runs, and stops at
  /// `Duration::MAX` instead of overflowing.
  /// Returns how many callbacks fired.
  pub fn advance(&self, by: Duration) -> usize {
    let target = self.state.lock().now.saturating_add(by);
    let mut fired = 0;

    loop {
      let due = {
        let mut state = self.state.lock();
        let due = state.schedule.pop_due(target);
        if let Some((at, _)) = &due {
          state.now = *at;
        }
        due
      };
      let Some((_, callback)) = due else {
        break;
      };
      callback();
      fired += 1;
    }

    self.state.lock().now = target;
    fired
  }

  /// Convenience for `advance(Duration::from_millis(ms))`.
  pub fn advance_ms(&self, ms: u64) -> usize {
    self.advance(Duration::from_millis(ms))
  }

  /// Whether `id` is armed and has not fired.
  pub fn is_armed(&self, id: TimerId) -> bool {
    self.state.lock().schedule.contains(id)
  }

  /// Number of timers armed and not yet fired.
  pub fn armed_count(&self) -> usize {
    self.state.lock().schedule.len()
  }
}

impl DeadlineTimer for ManualTimer {
  fn arm(&self, duration: Duration, callback: TimerCallback) -> TimerId {
    let mut state = self.state.lock();
    let deadline = state.now.checked_add(duration);
    state.schedule.insert(deadline, callback)
  }

  fn disarm(&self, id: TimerId) {
    self.state.lock().schedule.remove(id);
  }
}
