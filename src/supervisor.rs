// Background task wiring shared by the device build and the host simulation

use anyhow::Result;
use static_cell::StaticCell;
use std::sync::{Arc, Mutex};
use std::thread;

use supervisor_core::example_task::{ExampleTask, EXAMPLE_TASK_NAME};
use supervisor_core::{
    Clock, StuckTaskHandler, SupervisorConfig, TaskWatchdog, UpdateOrchestrator, WatchdogChecker,
};

// HTTP + OTA writes need the larger stack
const OTA_TASK_STACK: usize = 8 * 1024;
const WATCHDOG_TASK_STACK: usize = 4 * 1024;
const EXAMPLE_TASK_STACK: usize = 3 * 1024;

static WATCHDOG: StaticCell<TaskWatchdog> = StaticCell::new();

/// Build the process-wide watchdog registry and register every supervised task.
/// A duplicate name is a build-time mistake, so the error aborts boot.
pub fn init_watchdog(
    config: &SupervisorConfig,
    clock: Arc<dyn Clock>,
) -> Result<&'static TaskWatchdog> {
    let watchdog = WATCHDOG.init(TaskWatchdog::new(config.watchdog_timeout_ms, clock));
    if config.example_task_enabled {
        watchdog.register(EXAMPLE_TASK_NAME)?;
    }
    Ok(watchdog)
}

/// Start the periodic checker and, if enabled, the liveness demo task.
/// Returns the demo task's lock so it can be wedged on purpose.
pub fn spawn_watchdog_tasks(
    config: &SupervisorConfig,
    watchdog: &'static TaskWatchdog,
    handler: Box<dyn StuckTaskHandler>,
) -> Result<Option<Arc<Mutex<()>>>> {
    let interval = config.watchdog_check_interval();
    thread::Builder::new()
        .name("task-watchdog".to_string())
        .stack_size(WATCHDOG_TASK_STACK)
        .spawn(move || {
            WatchdogChecker::new(watchdog, handler, interval).run();
        })?;

    if !config.example_task_enabled {
        return Ok(None);
    }

    let task = ExampleTask::new(watchdog, config.example_task_interval());
    let lock = task.lock_handle();
    thread::Builder::new()
        .name(EXAMPLE_TASK_NAME.to_string())
        .stack_size(EXAMPLE_TASK_STACK)
        .spawn(move || {
            task.run();
        })?;

    Ok(Some(lock))
}

/// Run the update orchestrator on its own thread; the console owns the main one
pub fn spawn_orchestrator(mut orchestrator: UpdateOrchestrator) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("ota".to_string())
        .stack_size(OTA_TASK_STACK)
        .spawn(move || orchestrator.run())?;
    Ok(handle)
}
