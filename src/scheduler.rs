//! Timers that drive the sequencer clock.
//!
//! A [`Scheduler`] arms a task and hands back a [`TimerHandle`] that cancels
//! it. Each fire returns the gap to wait before the next one, which lets the
//! sequencer stretch swung steps. Fires of one timer never overlap: each call
//! to the task returns before the next one starts, and a late fire delays the
//! following ones instead of bunching them up.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::error::HaosError;

/// Work run on every fire. `Continue(gap)` fires again `gap` after this
/// fire was due; `Break` disarms the timer.
pub type StepTask = Box<dyn FnMut() -> ControlFlow<(), Duration> + Send + 'static>;

pub trait TimerHandle: Send {
    /// Stop firing. Waits for a fire in progress; no new fire starts once
    /// this returns.
    fn cancel(self: Box<Self>);
}

pub trait Scheduler {
    /// Arm `task` to fire `first` from now.
    fn schedule(&self, first: Duration, task: StepTask) -> Result<Box<dyn TimerHandle>, HaosError>;
}

// ── Thread timer ────────────────────────────────────────────

/// Runs each timer on its own named thread, sleeping against absolute
/// deadlines so the cadence does not drift with tick cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

struct ThreadTimer {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, first: Duration, mut task: StepTask) -> Result<Box<dyn TimerHandle>, HaosError> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("haos-clock".into())
            .spawn(move || {
                // `None` is a deadline past the end of `Instant`: only a stop wakes us.
                let mut deadline = Instant::now().checked_add(first);
                loop {
                    let woke = match deadline {
                        Some(at) => stopped.recv_deadline(at),
                        None => stopped.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    // Anything but a timeout is a stop request or a dropped handle.
                    if !matches!(woke, Err(RecvTimeoutError::Timeout)) {
                        break;
                    }
                    match task() {
                        ControlFlow::Break(()) => break,
                        ControlFlow::Continue(gap) => {
                            let now = Instant::now();
                            deadline = deadline.and_then(|at| at.checked_add(gap)).map(|at| at.max(now));
                        }
                    }
                }
            })
            .map_err(|e| {
                log::error!("failed to spawn sequencer clock thread: {e}");
                HaosError::Clock(e)
            })?;
        Ok(Box::new(ThreadTimer { stop, thread }))
    }
}

impl TimerHandle for ThreadTimer {
    fn cancel(self: Box<Self>) {
        let ThreadTimer { stop, thread } = *self;
        // The thread may already have exited on its own; a failed send is fine.
        let _ = stop.try_send(());
        if thread.join().is_err() {
            log::error!("sequencer clock thread panicked");
        }
    }
}

// ── Manual clock ────────────────────────────────────────────

/// A timer the host fires by hand.
///
/// Used where something else owns the real clock (a browser `setInterval`
/// calling into WASM, an offline preview) and in tests. Clones share the
/// same slot, so keep one clone to call [`ManualScheduler::fire`] on.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    slot: Arc<Mutex<ManualSlot>>,
}

#[derive(Default)]
struct ManualSlot {
    task: Option<StepTask>,
    period: Option<Duration>,
    generation: u64,
}

struct ManualTimer {
    slot: Arc<Mutex<ManualSlot>>,
    generation: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_armed(&self) -> bool {
        self.lock().task.is_some()
    }

    /// Delay before the armed timer's next fire: the first delay right after
    /// arming, then the gap returned by the last fire.
    pub fn period(&self) -> Option<Duration> {
        self.lock().period
    }

    /// Fire the armed task up to `times` times. Returns how many fires ran;
    /// fewer than `times` means the timer was disarmed along the way.
    pub fn fire(&self, times: usize) -> usize {
        for fired in 0..times {
            // Take the task out so the slot is not locked while it runs.
            let (mut task, generation) = {
                let mut slot = self.lock();
                match slot.task.take() {
                    Some(task) => (task, slot.generation),
                    None => return fired,
                }
            };

            let flow = task();

            let mut slot = self.lock();
            if slot.generation != generation {
                // Re-armed or cancelled while the task ran.
                continue;
            }
            match flow {
                ControlFlow::Break(()) => {
                    slot.period = None;
                    return fired + 1;
                }
                ControlFlow::Continue(gap) => {
                    slot.period = Some(gap);
                    slot.task = Some(task);
                }
            }
        }
        times
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, first: Duration, task: StepTask) -> Result<Box<dyn TimerHandle>, HaosError> {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.task = Some(task);
        slot.period = Some(first);
        Ok(Box::new(ManualTimer {
            slot: Arc::clone(&self.slot),
            generation: slot.generation,
        }))
    }
}

impl TimerHandle for ManualTimer {
    fn cancel(self: Box<Self>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation == self.generation {
            slot.task = None;
            slot.period = None;
            slot.generation += 1;
        }
    }
}

// ── Tokio timer ─────────────────────────────────────────────

#[cfg(feature = "tokio-timer")]
pub use tokio_timer::TokioScheduler;

#[cfg(feature = "tokio-timer")]
mod tokio_timer {
    use std::ops::ControlFlow;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use tokio::runtime::Handle;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;

    use super::{Scheduler, StepTask, TimerHandle};
    use crate::error::HaosError;

    /// Spawns each timer as a task on a tokio runtime.
    #[derive(Debug, Clone)]
    pub struct TokioScheduler {
        handle: Handle,
    }

    struct TokioTimer {
        /// Held for the whole of each fire, so taking it in `cancel` waits
        /// out a fire running on another worker.
        cancelled: Arc<Mutex<bool>>,
        join: JoinHandle<()>,
    }

    impl TokioScheduler {
        pub fn new(handle: Handle) -> Self {
            TokioScheduler { handle }
        }

        /// Use the runtime of the calling context. Panics outside a runtime.
        pub fn current() -> Self {
            TokioScheduler::new(Handle::current())
        }
    }

    impl Scheduler for TokioScheduler {
        fn schedule(&self, first: Duration, mut task: StepTask) -> Result<Box<dyn TimerHandle>, HaosError> {
            let cancelled = Arc::new(Mutex::new(false));
            let flag = Arc::clone(&cancelled);
            let join = self.handle.spawn(async move {
                let mut deadline = Instant::now().checked_add(first);
                loop {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                    let flow = {
                        let cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
                        if *cancelled {
                            break;
                        }
                        task()
                    };
                    match flow {
                        ControlFlow::Break(()) => break,
                        ControlFlow::Continue(gap) => {
                            let now = Instant::now();
                            deadline = deadline.and_then(|at| at.checked_add(gap)).map(|at| at.max(now));
                        }
                    }
                }
            });
            Ok(Box::new(TokioTimer { cancelled, join }))
        }
    }

    impl TimerHandle for TokioTimer {
        fn cancel(self: Box<Self>) {
            *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;
            self.join.abort();
        }
    }
}
