//! Task liveness watchdog
//!
//! A fixed set of named entries, registered once at boot. A supervised task
//! arms its entry with [`TaskWatchdog::start`] (re-arming just re-stamps the
//! time), and disarms it with [`TaskWatchdog::stop`]. A periodic checker calls
//! [`TaskWatchdog::check_all`] and reports every armed entry whose last reset is
//! older than its timeout.
//!
//! Each entry has a single writer (its task) and a single reader (the checker),
//! so the state is two atomics per entry and no lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{elapsed_ms, Clock};
use crate::config::WatchdogAction;
use crate::reboot::{RebootReason, RestartControl};
use crate::telemetry::{TelemetrySink, TraceEvent};

pub const DEFAULT_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Armed,
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogError {
    Duplicate(&'static str),
    RegistryFull(&'static str),
    EmptyName,
}

impl fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchdogError::Duplicate(name) => {
                write!(f, "task watchdog '{}' registered twice", name)
            }
            WatchdogError::RegistryFull(name) => {
                write!(f, "task watchdog registry full, cannot register '{}'", name)
            }
            WatchdogError::EmptyName => write!(f, "task watchdog name must not be empty"),
        }
    }
}

impl std::error::Error for WatchdogError {}

#[derive(Debug)]
struct WatchdogEntry {
    name: &'static str,
    armed: AtomicBool,
    last_reset_ms: AtomicU32,
    timeout_ms: Option<u32>,
}

/// An armed entry that missed its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckTask {
    pub name: &'static str,
    pub elapsed_ms: u32,
    pub timeout_ms: u32,
}

pub struct TaskWatchdog<const N: usize = DEFAULT_CAPACITY> {
    entries: heapless::Vec<WatchdogEntry, N>,
    timeout_ms: u32,
    clock: Arc<dyn Clock>,
}

impl<const N: usize> TaskWatchdog<N> {
    /// `timeout_ms` applies to every entry registered without its own timeout
    pub fn new(timeout_ms: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: heapless::Vec::new(),
            timeout_ms,
            clock,
        }
    }

    pub fn register(&mut self, name: &'static str) -> Result<(), WatchdogError> {
        self.insert(name, None)
    }

    pub fn register_with_timeout(
        &mut self,
        name: &'static str,
        timeout_ms: u32,
    ) -> Result<(), WatchdogError> {
        self.insert(name, Some(timeout_ms))
    }

    fn insert(&mut self, name: &'static str, timeout_ms: Option<u32>) -> Result<(), WatchdogError> {
        if name.is_empty() {
            return Err(WatchdogError::EmptyName);
        }
        if self.find(name).is_some() {
            log::error!("{}", WatchdogError::Duplicate(name));
            return Err(WatchdogError::Duplicate(name));
        }
        self.entries
            .push(WatchdogEntry {
                name,
                armed: AtomicBool::new(false),
                last_reset_ms: AtomicU32::new(0),
                timeout_ms,
            })
            .map_err(|_| WatchdogError::RegistryFull(name))?;
        log::debug!("Task watchdog '{}' registered", name);
        Ok(())
    }

    /// Arm the entry, or re-stamp it if already armed. Returns false for an
    /// unknown name.
    pub fn start(&self, name: &str) -> bool {
        let Some(entry) = self.lookup(name, "start") else {
            return false;
        };
        entry.last_reset_ms.store(self.clock.now_ms(), Ordering::Release);
        entry.armed.store(true, Ordering::Release);
        true
    }

    pub fn stop(&self, name: &str) -> bool {
        let Some(entry) = self.lookup(name, "stop") else {
            return false;
        };
        entry.armed.store(false, Ordering::Release);
        true
    }

    pub fn state(&self, name: &str) -> Option<EntryState> {
        self.find(name).map(|entry| {
            if entry.armed.load(Ordering::Acquire) {
                EntryState::Armed
            } else {
                EntryState::Disarmed
            }
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Scan every armed entry. Never modifies an entry's reset time.
    pub fn check_all(&self) -> heapless::Vec<StuckTask, N> {
        let mut stuck = heapless::Vec::new();

        for entry in self.entries.iter() {
            if !entry.armed.load(Ordering::Acquire) {
                continue;
            }
            let last_reset = entry.last_reset_ms.load(Ordering::Acquire);
            let now = self.clock.now_ms();
            // A stamp newer than our sample means the task was just petted
            let elapsed = match elapsed_ms(last_reset, now) {
                e if e > u32::MAX / 2 => 0,
                e => e,
            };
            let timeout_ms = entry.timeout_ms.unwrap_or(self.timeout_ms);
            if elapsed > timeout_ms {
                // Capacity matches the registry, so this cannot overflow
                let _ = stuck.push(StuckTask {
                    name: entry.name,
                    elapsed_ms: elapsed,
                    timeout_ms,
                });
            }
        }

        stuck
    }

    fn find(&self, name: &str) -> Option<&WatchdogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn lookup(&self, name: &str, op: &str) -> Option<&WatchdogEntry> {
        let entry = self.find(name);
        if entry.is_none() {
            log::warn!("Task watchdog {} for unregistered name '{}' ignored", op, name);
        }
        entry
    }
}

/// What happens to a task reported stuck
pub trait StuckTaskHandler: Send {
    fn on_stuck(&mut self, task: &StuckTask);
}

/// Log with full context, record a trace event and freeze the log buffer, then
/// restart if configured to
pub struct EscalatingHandler {
    action: WatchdogAction,
    telemetry: Box<dyn TelemetrySink>,
    restart: Box<dyn RestartControl>,
}

impl EscalatingHandler {
    pub fn new(
        action: WatchdogAction,
        telemetry: Box<dyn TelemetrySink>,
        restart: Box<dyn RestartControl>,
    ) -> Self {
        Self {
            action,
            telemetry,
            restart,
        }
    }
}

impl StuckTaskHandler for EscalatingHandler {
    fn on_stuck(&mut self, task: &StuckTask) {
        log::error!(
            "Task watchdog: '{}' stuck for {}ms (timeout {}ms)",
            task.name,
            task.elapsed_ms,
            task.timeout_ms
        );

        if let Err(e) = self
            .telemetry
            .trace_event(TraceEvent::task_watchdog(task.name, task.elapsed_ms))
        {
            log::warn!("Failed to record trace event: {:?}", e);
        }
        if let Err(e) = self.telemetry.trigger_log_collection() {
            log::warn!("Failed to trigger log collection: {:?}", e);
        }

        if self.action == WatchdogAction::Restart {
            let reason = RebootReason::TaskWatchdog;
            if let Err(e) = self.restart.mark_reset_imminent(reason) {
                log::error!("Failed to persist reboot marker: {:?}", e);
            }
            self.restart.restart(reason);
        }
    }
}

/// Periodic checker driving one watchdog
pub struct WatchdogChecker<'a, const N: usize = DEFAULT_CAPACITY> {
    watchdog: &'a TaskWatchdog<N>,
    handler: Box<dyn StuckTaskHandler>,
    interval: Duration,
}

impl<'a, const N: usize> WatchdogChecker<'a, N> {
    pub fn new(
        watchdog: &'a TaskWatchdog<N>,
        handler: Box<dyn StuckTaskHandler>,
        interval: Duration,
    ) -> Self {
        Self {
            watchdog,
            handler,
            interval,
        }
    }

    /// One check pass; returns how many tasks were reported
    pub fn check_once(&mut self) -> usize {
        let stuck = self.watchdog.check_all();
        for task in stuck.iter() {
            self.handler.on_stuck(task);
        }
        stuck.len()
    }

    pub fn run(&mut self) -> ! {
        log::info!(
            "Task watchdog checking {} entries every {}ms",
            self.watchdog.names().count(),
            self.interval.as_millis()
        );
        loop {
            std::thread::sleep(self.interval);
            self.check_once();
        }
    }
}
