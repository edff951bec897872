//! Host simulation
//!
//! Runs the same orchestrator and watchdog wiring as the device against
//! simulated WiFi, LED, update backend and restart. The update backend walks a
//! fixed script ending in a completed download, after which the run finishes
//! and the collected telemetry is printed.

use anyhow::{anyhow, Result};
use log::{info, LevelFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use supervisor_core::connectivity::AutoJoin;
use supervisor_core::log_buffer::LogBuffer;
use supervisor_core::reboot::{self, MemoryMarkerStore};
use supervisor_core::settings::{BackendConfig, MemorySettings, SettingKey, WifiCredentials};
use supervisor_core::watchdog::EscalatingHandler;
use supervisor_core::{
    CheckPhase, Clock, DiagnosticsTelemetry, DownloadResult, LedColor, MonotonicClock,
    NetworkJoiner, OrchestratorDeps, PendingUpdate, RebootMarker, RebootMarkerStore, RebootReason,
    RestartControl, StatusIndicator, SupervisorConfig, UpdateCheck, UpdateOrchestrator,
    WatchdogAction,
};

use crate::{logging, supervisor, version};

struct SimJoiner(Arc<AtomicBool>);

impl NetworkJoiner for SimJoiner {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<()> {
        info!("[sim] joining '{}'", credentials.ssid);
        self.0.store(true, Ordering::Release);
        Ok(())
    }
}

/// NoUpdate, a failed check, a deferred download, then a completed one
#[derive(Default)]
struct ScriptedBackend {
    checks: u32,
}

impl ScriptedBackend {
    fn release() -> PendingUpdate {
        PendingUpdate {
            version: "9.9.9".to_string(),
            url: "http://ota.local/firmware/9.9.9.bin".to_string(),
            size: Some(1024 * 1024),
        }
    }
}

impl UpdateCheck for ScriptedBackend {
    fn begin_update_check(&mut self) -> CheckPhase {
        self.checks += 1;
        match self.checks {
            1 => CheckPhase::NoUpdate,
            2 => CheckPhase::Failed(-1),
            _ => CheckPhase::UpdateFound(Self::release()),
        }
    }

    fn complete_update_check(&mut self, pending: PendingUpdate) -> DownloadResult {
        if self.checks == 3 {
            info!("[sim] deferring {}", pending.version);
            DownloadResult::Deferred
        } else {
            info!("[sim] staged {}", pending.version);
            DownloadResult::Downloaded
        }
    }
}

struct ConsoleLed;

impl StatusIndicator for ConsoleLed {
    fn set(&mut self, color: LedColor) {
        let (r, g, b) = color.rgb();
        info!("[sim] LED {:?} (r={} g={} b={})", color, r as u8, g as u8, b as u8);
    }
}

/// Records the marker but leaves the process running
struct SimRestart {
    markers: MemoryMarkerStore,
    clock: Arc<dyn Clock>,
}

impl RestartControl for SimRestart {
    fn mark_reset_imminent(&mut self, reason: RebootReason) -> Result<()> {
        self.markers.store(&RebootMarker {
            reason,
            uptime_ms: self.clock.now_ms(),
        })
    }

    fn restart(&mut self, reason: RebootReason) {
        info!("[sim] restart requested: {}", reason.tag());
        reboot::previous_reboot(&mut self.markers);
    }
}

pub fn run() -> Result<()> {
    let logs = Arc::new(LogBuffer::default());
    logging::init_logger(logs.clone(), LevelFilter::Info).map_err(|e| anyhow!("{}", e))?;
    info!("{} (host simulation)", version::full_version());

    let config = SupervisorConfig {
        ota_check_interval_secs: 2,
        watchdog_action: WatchdogAction::Log,
        ..SupervisorConfig::default()
    };
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let telemetry = Arc::new(Mutex::new(DiagnosticsTelemetry::new(Some(logs.clone()))));
    let restart = || SimRestart {
        markers: MemoryMarkerStore::default(),
        clock: clock.clone(),
    };

    let watchdog = supervisor::init_watchdog(&config, clock.clone())?;
    let handler = EscalatingHandler::new(
        config.watchdog_action,
        Box::new(telemetry.clone()),
        Box::new(restart()),
    );
    let example_lock = supervisor::spawn_watchdog_tasks(&config, watchdog, Box::new(handler))?;

    let settings = MemorySettings::new()
        .with(SettingKey::WifiSsid, "sim-network")
        .with(SettingKey::WifiPassword, "sim-password");
    let backend = BackendConfig::load(&settings);
    info!("[sim] backend overrides: {:?}", backend);

    let online = Arc::new(AtomicBool::new(false));
    let gate_state = online.clone();
    let deps = OrchestratorDeps {
        gate: Box::new(move || gate_state.load(Ordering::Acquire)),
        updater: Box::new(ScriptedBackend::default()),
        indicator: Box::new(ConsoleLed),
        telemetry: Box::new(telemetry.clone()),
        restart: Box::new(restart()),
        clock: clock.clone(),
        autojoin: Some(AutoJoin::new(Box::new(settings), Box::new(SimJoiner(online)))),
    };
    let ota = supervisor::spawn_orchestrator(UpdateOrchestrator::new(deps, &config))?;

    if let Some(lock) = example_lock {
        thread::sleep(Duration::from_secs(1));
        info!("[sim] wedging {}", supervisor_core::example_task::EXAMPLE_TASK_NAME);
        let guard = lock.lock().map_err(|_| anyhow!("example task lock poisoned"))?;
        thread::sleep(Duration::from_millis(3 * u64::from(config.watchdog_timeout_ms)));
        drop(guard);
        info!("[sim] released");
    }

    ota.join().map_err(|_| anyhow!("OTA task panicked"))?;

    let telemetry = telemetry.lock().map_err(|_| anyhow!("telemetry lock poisoned"))?;
    info!("[sim] telemetry: {}", telemetry.export_json()?);
    Ok(())
}
