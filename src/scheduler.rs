//! Timer capability used for lifespan expiry
//!
//! The pool never reaches for a global timer service. A [`Scheduler`] is
//! injected at construction: [`FrameScheduler`] keeps virtual time that the
//! game loop advances each frame, [`TokioScheduler`] sleeps on a tokio
//! runtime.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Deferred work registered with a scheduler
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle returned by [`Scheduler::schedule_once`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Fire-once, cancelable timers.
///
/// Implementations must never run a callback from inside `schedule_once` or
/// `cancel`; callbacks may call back into the pool, which in turn schedules
/// and cancels timers.
pub trait Scheduler: Send + Sync {
    /// Run `callback` once after `after` has elapsed
    fn schedule_once(&self, after: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancel a pending timer. Returns false when it already fired or was
    /// cancelled before.
    fn cancel(&self, handle: TimerHandle) -> bool;

    /// Time elapsed since the scheduler was created
    fn now(&self) -> Duration;
}

struct FrameState {
    now: Duration,
    pending: BTreeMap<(Duration, TimerHandle), TimerCallback>,
    deadlines: BTreeMap<TimerHandle, Duration>,
}

/// Deterministic scheduler driven by the game loop.
///
/// Time only moves when [`advance`](FrameScheduler::advance) is called, which
/// makes it the natural choice for fixed-step simulations and tests.
///
/// # Examples
///
/// ```
/// use esox_entitypool::{FrameScheduler, Scheduler};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
///
/// let scheduler = FrameScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
///
/// scheduler.schedule_once(Duration::from_millis(500), Box::new(move || {
///     flag.store(true, Ordering::SeqCst);
/// }));
///
/// scheduler.advance(Duration::from_millis(400));
/// assert!(!fired.load(Ordering::SeqCst));
///
/// scheduler.advance(Duration::from_millis(200));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
pub struct FrameScheduler {
    state: Mutex<FrameState>,
    next_handle: AtomicU64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FrameState {
                now: Duration::ZERO,
                pending: BTreeMap::new(),
                deadlines: BTreeMap::new(),
            }),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Move virtual time forward by `delta`, firing every timer that comes
    /// due in deadline order. Returns the number of callbacks run.
    ///
    /// Callbacks run without the scheduler lock held, so they may schedule or
    /// cancel timers; new timers due within this step fire in the same call.
    pub fn advance(&self, delta: Duration) -> usize {
        let target = self.state.lock().now + delta;
        let mut fired = 0;

        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state
                    .pending
                    .first_key_value()
                    .map(|(&(deadline, handle), _)| (deadline, handle));

                match next {
                    Some((deadline, handle)) if deadline <= target => {
                        state.now = state.now.max(deadline);
                        state.deadlines.remove(&handle);
                        state.pending.remove(&(deadline, handle))
                    }
                    _ => {
                        state.now = target;
                        None
                    }
                }
            };

            match due {
                Some(callback) => {
                    callback();
                    fired += 1;
                }
                None => break,
            }
        }

        fired
    }

    /// Number of timers still waiting to fire
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FrameScheduler {
    fn schedule_once(&self, after: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        let deadline = state.now + after;
        state.pending.insert((deadline, handle), callback);
        state.deadlines.insert(handle, deadline);
        handle
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let mut state = self.state.lock();
        match state.deadlines.remove(&handle) {
            Some(deadline) => state.pending.remove(&(deadline, handle)).is_some(),
            None => false,
        }
    }

    fn now(&self) -> Duration {
        self.state.lock().now
    }
}

struct TokioTimer {
    armed: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

/// Scheduler backed by a tokio runtime.
///
/// Each timer is a spawned task sleeping on `tokio::time`, so paused test
/// time (`tokio::time::advance`) drives it as well. Callbacks run on runtime
/// worker threads.
pub struct TokioScheduler {
    runtime: Handle,
    epoch: tokio::time::Instant,
    timers: Arc<DashMap<TimerHandle, TokioTimer>>,
    next_handle: AtomicU64,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            epoch: tokio::time::Instant::now(),
            timers: Arc::new(DashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Bind to the runtime of the calling context, if there is one
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, after: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let armed = Arc::new(AtomicBool::new(true));
        self.timers.insert(
            handle,
            TokioTimer {
                armed: Arc::clone(&armed),
                abort: None,
            },
        );

        let timers = Arc::clone(&self.timers);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            timers.remove(&handle);
            if armed.swap(false, Ordering::AcqRel) {
                callback();
            }
        });

        if let Some(mut timer) = self.timers.get_mut(&handle) {
            timer.abort = Some(task.abort_handle());
        }
        handle
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        match self.timers.remove(&handle) {
            Some((_, timer)) => {
                if let Some(abort) = timer.abort {
                    abort.abort();
                }
                timer.armed.swap(false, Ordering::AcqRel)
            }
            None => false,
        }
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
