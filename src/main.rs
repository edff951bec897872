mod logging;
mod supervisor;
mod version;

#[cfg(target_os = "espidf")]
mod led;
#[cfg(target_os = "espidf")]
mod network;
#[cfg(target_os = "espidf")]
mod storage;
#[cfg(target_os = "espidf")]
mod system;

#[cfg(not(target_os = "espidf"))]
mod host_sim;

#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // Binstart

// Generate ESP-IDF app descriptor
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    host_sim::run()
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use anyhow::anyhow;
    use esp_idf_hal::prelude::*;
    use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
    use log::{info, LevelFilter};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use supervisor_core::connectivity::AutoJoin;
    use supervisor_core::log_buffer::LogBuffer;
    use supervisor_core::reboot;
    use supervisor_core::settings::BackendConfig;
    use supervisor_core::watchdog::EscalatingHandler;
    use supervisor_core::{
        Clock, DiagnosticsTelemetry, MonotonicClock, OrchestratorDeps, UpdateOrchestrator,
    };

    use crate::network::{ota::HttpUpdateClient, wifi::{WifiGate, WifiJoiner, WifiManager}};
    use crate::system::restart::{self, EspRestart};

    // How often buffered diagnostics are flushed to the console
    const REPORT_INTERVAL: Duration = Duration::from_secs(60);

    esp_idf_svc::sys::link_patches();

    let logs = Arc::new(LogBuffer::default());
    logging::init_logger(logs.clone(), LevelFilter::Info).map_err(|e| anyhow!("{}", e))?;

    info!("{}", version::full_version());
    info!("Boot reason: {}", restart::get_reset_reason());

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = storage::load_or_default(nvs.clone())?;
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut markers = storage::NvsMarkerStore::new(nvs.clone())?;
    reboot::previous_reboot(&mut markers);

    let telemetry = Arc::new(Mutex::new(DiagnosticsTelemetry::new(Some(logs.clone()))));

    // Task watchdog before anything that could hang
    let watchdog = supervisor::init_watchdog(&config, clock.clone())?;
    let handler = EscalatingHandler::new(
        config.watchdog_action,
        Box::new(telemetry.clone()),
        Box::new(EspRestart::new(storage::NvsMarkerStore::new(nvs.clone())?, clock.clone())),
    );
    supervisor::spawn_watchdog_tasks(&config, watchdog, Box::new(handler))?;

    let led = led::RgbLed::new(
        peripherals.pins.gpio4.into(),
        peripherals.pins.gpio5.into(),
        peripherals.pins.gpio18.into(),
    )?;

    let wifi = Arc::new(Mutex::new(WifiManager::new(peripherals.modem, sys_loop, nvs.clone())?));
    let settings = storage::NvsSettings::new(nvs.clone())?;
    let backend = BackendConfig::load(&settings);

    let deps = OrchestratorDeps {
        gate: Box::new(WifiGate(wifi.clone())),
        updater: Box::new(HttpUpdateClient::new(backend)),
        indicator: Box::new(led),
        telemetry: Box::new(telemetry.clone()),
        restart: Box::new(EspRestart::new(markers, clock.clone())),
        clock,
        autojoin: Some(AutoJoin::new(Box::new(settings), Box::new(WifiJoiner(wifi)))),
    };
    supervisor::spawn_orchestrator(UpdateOrchestrator::new(deps, &config))?;

    loop {
        std::thread::sleep(REPORT_INTERVAL);

        let mut telemetry = telemetry.lock().map_err(|_| anyhow!("telemetry lock poisoned"))?;
        for batch in telemetry.take_log_batches() {
            info!("Uploading log batch ({} lines)", batch.len());
        }
        log::debug!("Telemetry: {}", telemetry.export_json()?);
    }
}
