//! Update orchestrator
//!
//! One tick, once per check interval:
//! 1. Optionally auto-join Wi-Fi with stored credentials
//! 2. Ask the connectivity gate; if offline, show red and stop
//! 3. Run the two-phase update check, opening a metrics session when an update
//!    is found and closing it (code 0) right before the post-download restart
//! 4. Classify the result, record sync telemetry, drive the status LED
//!
//! Every failure inside a tick is logged and retried on the next tick. The only
//! way out of [`UpdateOrchestrator::run`] is the restart after a download.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::SupervisorConfig;
use crate::connectivity::{AutoJoin, ConnectivityGate};
use crate::indicator::{LedColor, StatusIndicator};
use crate::reboot::{RebootReason, RestartControl};
use crate::session::{SessionTracker, RESULT_DEFERRED, RESULT_SUCCESS};
use crate::telemetry::{Counter, TelemetrySink, TraceEvent};
use crate::update::{CheckPhase, DownloadResult, PendingUpdate, UpdateCheck, UpdateOutcome};

/// Collaborators the orchestrator drives. It owns all of them exclusively.
pub struct OrchestratorDeps {
    pub gate: Box<dyn ConnectivityGate>,
    pub updater: Box<dyn UpdateCheck>,
    pub indicator: Box<dyn StatusIndicator>,
    pub telemetry: Box<dyn TelemetrySink>,
    pub restart: Box<dyn RestartControl>,
    pub clock: Arc<dyn Clock>,
    pub autojoin: Option<AutoJoin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// No connectivity; the update check was skipped
    Offline,
    Checked(UpdateOutcome),
    /// A download completed and the restart was requested
    Restarting,
}

pub struct UpdateOrchestrator {
    deps: OrchestratorDeps,
    interval: Duration,
    wifi_autojoin: bool,
    record_sync_metrics: bool,
    download_updates: bool,
    session: SessionTracker,
    indicator: LedColor,
}

impl UpdateOrchestrator {
    pub fn new(deps: OrchestratorDeps, config: &SupervisorConfig) -> Self {
        Self {
            deps,
            interval: config.ota_check_interval(),
            wifi_autojoin: config.wifi_autojoin,
            record_sync_metrics: config.record_sync_metrics,
            download_updates: config.download_updates,
            session: SessionTracker::new(),
            indicator: LedColor::Off,
        }
    }

    /// Last color written to the status LED
    pub fn indicator(&self) -> LedColor {
        self.indicator
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// Tick forever. Returns only after a completed download has requested a
    /// restart, which on the device does not return at all.
    pub fn run(&mut self) {
        log::info!(
            "OTA task up and running every {}s.",
            self.interval.as_secs()
        );
        loop {
            if self.tick() == TickResult::Restarting {
                log::warn!("Restart requested but still running; leaving OTA loop");
                return;
            }
            std::thread::sleep(self.interval);
        }
    }

    pub fn tick(&mut self) -> TickResult {
        self.count(Counter::OtaTaskSchedules);

        if self.wifi_autojoin {
            if let Some(autojoin) = self.deps.autojoin.as_mut() {
                autojoin.attempt(self.deps.gate.as_ref());
            }
        }

        if !self.deps.gate.is_connected() {
            log::debug!("No connectivity, skipping OTA check");
            self.set_indicator(LedColor::Red);
            return TickResult::Offline;
        }

        log::info!("Checking for OTA Update");
        let outcome = match self.deps.updater.begin_update_check() {
            CheckPhase::NoUpdate => UpdateOutcome::UpToDate,
            CheckPhase::Failed(code) => UpdateOutcome::failed(code),
            CheckPhase::UpdateFound(pending) => {
                self.on_update_available(&pending);
                if !self.download_updates {
                    UpdateOutcome::UpdateAvailable
                } else {
                    match self.deps.updater.complete_update_check(pending) {
                        DownloadResult::Downloaded => {
                            self.on_download_complete();
                            return TickResult::Restarting;
                        }
                        DownloadResult::Deferred => UpdateOutcome::UpdateAvailable,
                        DownloadResult::Failed(code) => UpdateOutcome::failed(code),
                    }
                }
            }
        };

        if self.record_sync_metrics {
            self.count(if outcome.is_sync_success() {
                Counter::SyncSuccess
            } else {
                Counter::SyncFailure
            });
        }

        self.apply_outcome(outcome);

        // A session opened this tick must not outlive it
        if self.session.is_open() {
            log::warn!("Update found but not installed this tick; closing OTA session");
            self.end_session(RESULT_DEFERRED);
        }

        TickResult::Checked(outcome)
    }

    fn on_update_available(&mut self, pending: &PendingUpdate) {
        self.set_indicator(LedColor::Blue);
        log::info!("Starting OTA download of {} ...", pending.version);
        let now = self.deps.clock.now_ms();
        // Misuse is already logged by the tracker
        let _ = self.session.start(now);
    }

    fn on_download_complete(&mut self) {
        log::info!("OTA Update Complete, Rebooting System");

        // Must be recorded before the restart, or the attempt is lost
        self.end_session(RESULT_SUCCESS);

        let reason = RebootReason::FirmwareUpdate;
        if let Err(e) = self.deps.restart.mark_reset_imminent(reason) {
            log::error!("Failed to persist reboot marker: {:?}", e);
        }
        self.deps.restart.restart(reason);
    }

    fn apply_outcome(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::UpToDate => {
                log::info!("Up to date!");
                self.set_indicator(LedColor::Green);
            }
            UpdateOutcome::UpdateAvailable => {
                log::info!("Update available!");
            }
            UpdateOutcome::Failed(code) => {
                log::error!("OTA update failed, rv={}", code);
                if self.session.is_open() {
                    self.end_session(code);
                }
                if let Err(e) = self
                    .deps
                    .telemetry
                    .trace_event(TraceEvent::ota_install_failure(code))
                {
                    log::warn!("Failed to record trace event: {:?}", e);
                }
                if let Err(e) = self.deps.telemetry.trigger_log_collection() {
                    log::warn!("Failed to trigger log collection: {:?}", e);
                }
                self.set_indicator(LedColor::Red);
            }
        }
    }

    fn end_session(&mut self, code: i32) {
        let now = self.deps.clock.now_ms();
        if let Ok(record) = self.session.end(code, now) {
            if let Err(e) = self.deps.telemetry.record_session(&record) {
                log::warn!("Failed to record OTA session: {:?}", e);
            }
        }
    }

    fn count(&mut self, counter: Counter) {
        if let Err(e) = self.deps.telemetry.increment(counter) {
            log::warn!("Failed to record {} metric: {:?}", counter.name(), e);
        }
    }

    fn set_indicator(&mut self, color: LedColor) {
        self.indicator = color;
        self.deps.indicator.set(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;

    struct NullIndicator;
    impl StatusIndicator for NullIndicator {
        fn set(&mut self, _color: LedColor) {}
    }

    struct NullRestart;
    impl RestartControl for NullRestart {
        fn mark_reset_imminent(&mut self, _reason: RebootReason) -> anyhow::Result<()> {
            Ok(())
        }
        fn restart(&mut self, _reason: RebootReason) {}
    }

    struct FixedUpdate(CheckPhase, DownloadResult);
    impl UpdateCheck for FixedUpdate {
        fn begin_update_check(&mut self) -> CheckPhase {
            self.0.clone()
        }
        fn complete_update_check(&mut self, _pending: PendingUpdate) -> DownloadResult {
            self.1
        }
    }

    struct FlakyTelemetry;
    impl TelemetrySink for FlakyTelemetry {
        fn increment(&mut self, _counter: Counter) -> anyhow::Result<()> {
            anyhow::bail!("metrics storage full")
        }
        fn record_session(
            &mut self,
            _record: &crate::session::SessionRecord,
        ) -> anyhow::Result<()> {
            anyhow::bail!("metrics storage full")
        }
        fn trace_event(&mut self, _event: TraceEvent) -> anyhow::Result<()> {
            anyhow::bail!("metrics storage full")
        }
        fn trigger_log_collection(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("metrics storage full")
        }
    }

    fn orchestrator(
        phase: CheckPhase,
        download: DownloadResult,
        config: &SupervisorConfig,
    ) -> UpdateOrchestrator {
        let deps = OrchestratorDeps {
            gate: Box::new(|| true),
            updater: Box::new(FixedUpdate(phase, download)),
            indicator: Box::new(NullIndicator),
            telemetry: Box::new(FlakyTelemetry),
            restart: Box::new(NullRestart),
            clock: Arc::new(MonotonicClock::new()),
            autojoin: None,
        };
        UpdateOrchestrator::new(deps, config)
    }

    fn pending() -> CheckPhase {
        CheckPhase::UpdateFound(PendingUpdate {
            version: "1.2.3".into(),
            url: "http://ota.local/fw.bin".into(),
            size: None,
        })
    }

    #[test]
    fn test_telemetry_failures_do_not_stop_the_tick() {
        let mut orch = orchestrator(
            CheckPhase::Failed(-5),
            DownloadResult::Deferred,
            &SupervisorConfig::default(),
        );
        assert_eq!(orch.tick(), TickResult::Checked(UpdateOutcome::Failed(-5)));
        assert_eq!(orch.indicator(), LedColor::Red);
    }

    #[test]
    fn test_deferred_download_leaves_blue_and_closes_session() {
        let mut orch = orchestrator(
            pending(),
            DownloadResult::Deferred,
            &SupervisorConfig::default(),
        );
        assert_eq!(orch.tick(), TickResult::Checked(UpdateOutcome::UpdateAvailable));
        assert_eq!(orch.indicator(), LedColor::Blue);
        assert!(!orch.session().is_open());
    }

    #[test]
    fn test_download_disabled_reports_available() {
        let config = SupervisorConfig {
            download_updates: false,
            ..Default::default()
        };
        let mut orch = orchestrator(pending(), DownloadResult::Downloaded, &config);
        assert_eq!(orch.tick(), TickResult::Checked(UpdateOutcome::UpdateAvailable));
        assert!(!orch.session().is_open());
    }

    #[test]
    fn test_mid_download_failure_closes_session() {
        let mut orch = orchestrator(
            pending(),
            DownloadResult::Failed(-9),
            &SupervisorConfig::default(),
        );
        assert_eq!(orch.tick(), TickResult::Checked(UpdateOutcome::Failed(-9)));
        assert!(!orch.session().is_open());
        assert_eq!(orch.indicator(), LedColor::Red);
    }

    #[test]
    fn test_restart_that_returns_ends_run() {
        let mut orch = orchestrator(
            pending(),
            DownloadResult::Downloaded,
            &SupervisorConfig::default(),
        );
        // NullRestart returns, so run() must come back instead of looping
        orch.run();
        assert!(!orch.session().is_open());
    }
}
