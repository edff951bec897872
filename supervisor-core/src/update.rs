/// Update-check capability, split into two explicit phases
///
/// Phase one asks the backend whether an update exists. If one does, the
/// orchestrator runs its "update available" step (indicator, session) and only
/// then calls phase two, which downloads the image. A `Downloaded` result means
/// the new image is staged and a reboot is required to run it.
use serde::Serialize;

/// Legacy return code: no update available
pub const RV_NO_UPDATE: i32 = 0;
/// Legacy return code: update found, download not (yet) performed
pub const RV_UPDATE_AVAILABLE: i32 = 1;
/// Used when an adapter reports a failure without a negative code
pub const RV_GENERIC_FAILURE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub version: String,
    pub url: String,
    pub size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckPhase {
    NoUpdate,
    UpdateFound(PendingUpdate),
    Failed(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadResult {
    /// Image written and marked bootable; reboot required
    Downloaded,
    /// Update left for a later tick
    Deferred,
    Failed(i32),
}

/// Blocking update-check capability provided by the platform
pub trait UpdateCheck: Send {
    fn begin_update_check(&mut self) -> CheckPhase;
    fn complete_update_check(&mut self, pending: PendingUpdate) -> DownloadResult;
}

/// Terminal classification of one update-check cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateOutcome {
    UpToDate,
    UpdateAvailable,
    Failed(i32),
}

impl UpdateOutcome {
    /// Failure with a guaranteed non-zero, negative code, so a failed session
    /// can never be recorded as a success
    pub fn failed(code: i32) -> Self {
        if code < 0 {
            UpdateOutcome::Failed(code)
        } else {
            log::warn!("Update failure reported with non-negative code {}", code);
            UpdateOutcome::Failed(RV_GENERIC_FAILURE)
        }
    }

    /// Classify an integer result from a callback-style update client
    pub fn from_return_code(rv: i32) -> Self {
        match rv {
            RV_NO_UPDATE => UpdateOutcome::UpToDate,
            rv if rv < 0 => UpdateOutcome::Failed(rv),
            _ => UpdateOutcome::UpdateAvailable,
        }
    }

    pub fn return_code(self) -> i32 {
        match self {
            UpdateOutcome::UpToDate => RV_NO_UPDATE,
            UpdateOutcome::UpdateAvailable => RV_UPDATE_AVAILABLE,
            UpdateOutcome::Failed(code) => code,
        }
    }

    /// Whether the backend was reached successfully
    pub fn is_sync_success(self) -> bool {
        !matches!(self, UpdateOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_return_codes() {
        assert_eq!(UpdateOutcome::from_return_code(0), UpdateOutcome::UpToDate);
        assert_eq!(UpdateOutcome::from_return_code(1), UpdateOutcome::UpdateAvailable);
        assert_eq!(UpdateOutcome::from_return_code(7), UpdateOutcome::UpdateAvailable);
        assert_eq!(UpdateOutcome::from_return_code(-12), UpdateOutcome::Failed(-12));
    }

    #[test]
    fn test_failed_code_is_never_success() {
        assert_eq!(UpdateOutcome::failed(-3), UpdateOutcome::Failed(-3));
        assert_eq!(UpdateOutcome::failed(0), UpdateOutcome::Failed(RV_GENERIC_FAILURE));
        assert_eq!(UpdateOutcome::failed(5), UpdateOutcome::Failed(RV_GENERIC_FAILURE));
    }

    #[test]
    fn test_sync_success() {
        assert!(UpdateOutcome::UpToDate.is_sync_success());
        assert!(UpdateOutcome::UpdateAvailable.is_sync_success());
        assert!(!UpdateOutcome::Failed(-1).is_sync_success());
    }
}
