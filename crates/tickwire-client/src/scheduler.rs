use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::sync::lock;

/// Identifies a periodic task registered with a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Work run on every timer expiry.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// Periodic task execution.
///
/// The connection manager only needs "run this every interval" and
/// "stop running it"; tests substitute a recording implementation.
pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval` until cancelled. The first run happens
    /// one interval after registration.
    fn run_every(&self, interval: Duration, task: Task) -> io::Result<TimerHandle>;

    /// Stop a task. Unknown or already-cancelled handles are ignored.
    fn cancel(&self, handle: TimerHandle);
}

/// [`Scheduler`] backed by one named thread per task.
#[derive(Default)]
pub struct ThreadScheduler {
    next_id: AtomicU64,
    timers: Mutex<HashMap<u64, Timer>>,
}

struct Timer {
    signal: Arc<CancelSignal>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct CancelSignal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelSignal {
    /// Sleep until `deadline` or cancellation. Returns `true` if cancelled.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = lock(&self.cancelled);
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = match self.wake.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn cancel(&self) {
        *lock(&self.cancelled) = true;
        self.wake.notify_all();
    }
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently registered.
    pub fn active(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Scheduler for ThreadScheduler {
    fn run_every(&self, interval: Duration, task: Task) -> io::Result<TimerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let interval = interval.max(Duration::from_millis(1));
        let signal = Arc::new(CancelSignal::default());
        let thread_signal = Arc::clone(&signal);

        let thread = thread::Builder::new()
            .name(format!("tickwire-timer-{id}"))
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                while !thread_signal.wait_until(deadline) {
                    task();
                    deadline += interval;
                    // Skip missed periods instead of firing back to back.
                    let now = Instant::now();
                    if deadline < now {
                        deadline = now + interval;
                    }
                }
                trace!(timer = id, "timer stopped");
            })?;

        lock(&self.timers).insert(id, Timer { signal, thread });
        trace!(timer = id, ?interval, "timer scheduled");
        Ok(TimerHandle(id))
    }

    fn cancel(&self, handle: TimerHandle) {
        let Some(timer) = lock(&self.timers).remove(&handle.0) else {
            return;
        };
        timer.signal.cancel();

        // A task cancelling its own timer cannot wait for itself.
        if timer.thread.thread().id() == current_thread() {
            return;
        }
        if timer.thread.join().is_err() {
            warn!(timer = handle.0, "timer thread panicked");
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        let timers: Vec<_> = lock(&self.timers).drain().collect();
        for (_, timer) in timers {
            timer.signal.cancel();
            if timer.thread.thread().id() != current_thread() {
                let _ = timer.thread.join();
            }
        }
    }
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("active", &self.active())
            .finish()
    }
}

fn current_thread() -> ThreadId {
    thread::current().id()
}
