//! Liveness demo task
//!
//! Every interval the task arms its watchdog entry, takes and releases its own
//! lock, then disarms. If something else holds the lock the task blocks while
//! armed and the checker reports it, which is indistinguishable from a hung task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::watchdog::TaskWatchdog;

pub const EXAMPLE_TASK_NAME: &str = "example_task";

pub struct ExampleTask<'a, const N: usize> {
    watchdog: &'a TaskWatchdog<N>,
    lock: Arc<Mutex<()>>,
    interval: Duration,
}

impl<'a, const N: usize> ExampleTask<'a, N> {
    pub fn new(watchdog: &'a TaskWatchdog<N>, interval: Duration) -> Self {
        Self {
            watchdog,
            lock: Arc::new(Mutex::new(())),
            interval,
        }
    }

    /// The task's own lock. Holding it from elsewhere wedges the task.
    pub fn lock_handle(&self) -> Arc<Mutex<()>> {
        self.lock.clone()
    }

    pub fn run_once(&self) {
        self.watchdog.start(EXAMPLE_TASK_NAME);

        // Blocks for as long as someone else holds the lock
        let guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(guard);

        self.watchdog.stop(EXAMPLE_TASK_NAME);
    }

    pub fn run(&self) -> ! {
        log::info!(
            "Task watchdog example task running every {}ms.",
            self.interval.as_millis()
        );
        loop {
            self.run_once();
            std::thread::sleep(self.interval);
        }
    }
}
