/// Supervisor configuration that can be tested independently
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the watchdog checker does when a task is reported stuck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchdogAction {
    /// Log and record a trace event, keep running
    Log,
    /// Log, record, persist a reboot marker and restart the device
    Restart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    // OTA settings
    pub ota_check_interval_secs: u32,
    pub wifi_autojoin: bool,
    pub record_sync_metrics: bool,
    pub download_updates: bool,

    // Task watchdog
    pub watchdog_check_interval_ms: u32,
    pub watchdog_timeout_ms: u32,
    pub watchdog_action: WatchdogAction,

    // Liveness demo task
    pub example_task_enabled: bool,
    pub example_task_interval_ms: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ota_check_interval_secs: 60 * 60,
            wifi_autojoin: true,
            record_sync_metrics: true,
            download_updates: true,
            watchdog_check_interval_ms: 1000,
            watchdog_timeout_ms: 1000,
            watchdog_action: WatchdogAction::Restart,
            example_task_enabled: true,
            example_task_interval_ms: 250,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ota_check_interval_secs == 0 {
            bail!("ota_check_interval_secs must be non-zero");
        }
        if self.watchdog_check_interval_ms == 0 {
            bail!("watchdog_check_interval_ms must be non-zero");
        }
        if self.watchdog_timeout_ms == 0 {
            bail!("watchdog_timeout_ms must be non-zero");
        }
        if self.example_task_enabled && self.example_task_interval_ms == 0 {
            bail!("example_task_interval_ms must be non-zero when the example task is enabled");
        }
        Ok(())
    }

    /// Parse and validate a stored JSON blob
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: SupervisorConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn ota_check_interval(&self) -> Duration {
        Duration::from_secs(self.ota_check_interval_secs as u64)
    }

    pub fn watchdog_check_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_check_interval_ms as u64)
    }

    pub fn example_task_interval(&self) -> Duration {
        Duration::from_millis(self.example_task_interval_ms as u64)
    }
}
