use anyhow::Result;
use std::sync::Arc;

use supervisor_core::{Clock, RebootMarker, RebootMarkerStore, RebootReason, RestartControl};

use crate::storage::NvsMarkerStore;

/// Restart primitive for the device: persist why, flush logs, reset
pub struct EspRestart {
    markers: NvsMarkerStore,
    clock: Arc<dyn Clock>,
}

impl EspRestart {
    pub fn new(markers: NvsMarkerStore, clock: Arc<dyn Clock>) -> Self {
        Self { markers, clock }
    }
}

impl RestartControl for EspRestart {
    fn mark_reset_imminent(&mut self, reason: RebootReason) -> Result<()> {
        self.markers.store(&RebootMarker {
            reason,
            uptime_ms: self.clock.now_ms(),
        })
    }

    fn restart(&mut self, reason: RebootReason) {
        log::warn!("Restarting: {}", reason.tag());
        log::logger().flush();

        // Let the UART drain
        esp_idf_hal::delay::FreeRtos::delay_ms(100);
        esp_idf_hal::reset::restart();
    }
}

/// Get the last reset reason as a string
pub fn get_reset_reason() -> &'static str {
    let reason = unsafe { esp_idf_sys::esp_reset_reason() };

    match reason {
        esp_idf_sys::esp_reset_reason_t_ESP_RST_POWERON => "Power-on",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_EXT => "External pin",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_SW => "Software reset",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_PANIC => "Panic",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_INT_WDT => "Interrupt watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_TASK_WDT => "Task watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_WDT => "Other watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_DEEPSLEEP => "Deep sleep",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_BROWNOUT => "Brownout",
        _ => "Unknown",
    }
}
