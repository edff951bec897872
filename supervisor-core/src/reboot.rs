/// Restart primitive and the reboot-imminent marker persisted across it
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebootReason {
    FirmwareUpdate,
    TaskWatchdog,
}

impl RebootReason {
    pub fn tag(self) -> &'static str {
        match self {
            RebootReason::FirmwareUpdate => "firmware update",
            RebootReason::TaskWatchdog => "task watchdog",
        }
    }
}

/// Written just before a deliberate restart and read back on the next boot to
/// tell update-triggered reboots apart from other reset causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootMarker {
    pub reason: RebootReason,
    pub uptime_ms: u32,
}

impl RebootMarker {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub trait RebootMarkerStore: Send {
    fn store(&mut self, marker: &RebootMarker) -> Result<()>;
    /// Read and clear the marker
    fn take(&mut self) -> Result<Option<RebootMarker>>;
}

/// Irreversible restart. On the device `restart` never returns.
pub trait RestartControl: Send {
    fn mark_reset_imminent(&mut self, reason: RebootReason) -> Result<()>;
    fn restart(&mut self, reason: RebootReason);
}

/// Marker store that only lives as long as the process (host simulation, tests)
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    marker: Option<RebootMarker>,
}

impl RebootMarkerStore for MemoryMarkerStore {
    fn store(&mut self, marker: &RebootMarker) -> Result<()> {
        self.marker = Some(*marker);
        Ok(())
    }

    fn take(&mut self) -> Result<Option<RebootMarker>> {
        Ok(self.marker.take())
    }
}

/// Read back the marker left by the previous boot, if any. Never fails boot.
pub fn previous_reboot(store: &mut dyn RebootMarkerStore) -> Option<RebootMarker> {
    match store.take() {
        Ok(Some(marker)) => {
            log::info!(
                "Previous reboot was deliberate: {} (after {}s uptime)",
                marker.reason.tag(),
                marker.uptime_ms / 1000
            );
            Some(marker)
        }
        Ok(None) => None,
        Err(e) => {
            log::warn!("Failed to read reboot marker: {:?}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_consumed_once() {
        let mut store = MemoryMarkerStore::default();
        let marker = RebootMarker {
            reason: RebootReason::FirmwareUpdate,
            uptime_ms: 12_000,
        };
        store.store(&marker).unwrap();
        assert_eq!(previous_reboot(&mut store), Some(marker));
        assert_eq!(previous_reboot(&mut store), None);
    }

    #[test]
    fn test_marker_json() {
        let marker = RebootMarker {
            reason: RebootReason::TaskWatchdog,
            uptime_ms: 5,
        };
        let bytes = marker.to_json().unwrap();
        assert_eq!(RebootMarker::from_json(&bytes).unwrap(), marker);
        assert!(RebootMarker::from_json(b"{}").is_err());
    }

    #[test]
    fn test_reason_tag() {
        assert_eq!(RebootReason::FirmwareUpdate.tag(), "firmware update");
    }
}
