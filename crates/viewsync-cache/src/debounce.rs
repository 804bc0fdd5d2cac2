//! Coalesces bursts of cache mutations into a single version bump.
//!
//! Timers are modelled as explicit scheduled callbacks with a cancel handle so
//! the debouncer works the same on a tokio runtime and under a manually driven
//! clock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

/// Quiet period used when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled callback.
pub trait TimerHandle: Send + Sync {
    /// Prevent the callback from running. No-op once it has fired.
    fn cancel(&self);
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle>;
}

/// Runs callbacks on a tokio runtime after `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime of the caller, if there is one.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

struct TokioTimer(tokio::task::AbortHandle);

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Box::new(TokioTimer(task.abort_handle()))
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: Vec<(u64, Duration, TimerCallback)>,
}

/// Deterministic scheduler whose clock only moves through [`ManualScheduler::advance`].
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

struct ManualTimer {
    id: u64,
    state: Weak<Mutex<ManualState>>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().timers.retain(|(id, _, _)| *id != self.id);
        }
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Move the clock forward and run every callback that came due, in due order.
    /// Returns how many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut fired = 0;

        loop {
            // callbacks run without the lock held so they may schedule again
            let next = {
                let mut state = self.state.lock();
                let due = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, at, _))| *at <= target)
                    .min_by_key(|(_, (id, at, _))| (*at, *id))
                    .map(|(idx, _)| idx);
                match due {
                    Some(idx) => {
                        let (_, at, callback) = state.timers.remove(idx);
                        state.now = at;
                        Some(callback)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            match next {
                Some(callback) => {
                    callback();
                    fired += 1;
                }
                None => return fired,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        state.timers.push((id, due, callback));
        Box::new(ManualTimer {
            id,
            state: Arc::downgrade(&self.state),
        })
    }
}

struct DebounceState {
    version: watch::Sender<u64>,
    generation: AtomicU64,
    pending: Mutex<Option<(u64, Box<dyn TimerHandle>)>>,
}

impl DebounceState {
    fn fire(&self, generation: u64) {
        let mut pending = self.pending.lock();
        // a superseded timer that could not be aborted in time
        if !matches!(pending.as_ref(), Some((g, _)) if *g == generation) {
            return;
        }
        *pending = None;
        self.version.send_modify(|v| *v += 1);
        trace!(version = *self.version.borrow(), "Cache version bumped");
    }
}

/// Monotonic cache version bumped once per quiet period after a burst of
/// [`signal`](VersionDebouncer::signal) calls.
pub struct VersionDebouncer {
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    state: Arc<DebounceState>,
}

impl VersionDebouncer {
    pub fn new(delay: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            delay,
            scheduler,
            state: Arc::new(DebounceState {
                version,
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Restart the quiet period.
    pub fn signal(&self) {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.state);

        let mut pending = self.state.pending.lock();
        if let Some((_, timer)) = pending.take() {
            timer.cancel();
        }
        let timer = self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.fire(generation);
                }
            }),
        );
        *pending = Some((generation, timer));
    }

    /// Cancel a pending bump, e.g. when the consumer is torn down.
    pub fn cancel(&self) {
        if let Some((_, timer)) = self.state.pending.lock().take() {
            timer.cancel();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.lock().is_some()
    }

    pub fn version(&self) -> u64 {
        *self.state.version.borrow()
    }

    /// Receiver that observes every version bump.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.state.version.subscribe()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for VersionDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for VersionDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionDebouncer")
            .field("delay", &self.delay)
            .field("version", &self.version())
            .field("pending", &self.is_pending())
            .finish()
    }
}
