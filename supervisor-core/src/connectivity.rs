/// Connectivity gate and Wi-Fi auto-join
use anyhow::Result;

use crate::settings::{SettingsStore, WifiCredentials};

/// "Is there a route to the update backend right now?"
///
/// A pure read with no caching; the orchestrator re-queries it on every tick.
pub trait ConnectivityGate: Send {
    fn is_connected(&self) -> bool;
}

impl<F> ConnectivityGate for F
where
    F: Fn() -> bool + Send,
{
    fn is_connected(&self) -> bool {
        self()
    }
}

/// Something that can join a Wi-Fi network with stored credentials
pub trait NetworkJoiner: Send {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAttempt {
    AlreadyConnected,
    NoCredentials,
    Joined,
    Failed,
}

/// Best-effort network join run at the start of each orchestrator tick
pub struct AutoJoin {
    settings: Box<dyn SettingsStore>,
    joiner: Box<dyn NetworkJoiner>,
}

impl AutoJoin {
    pub fn new(settings: Box<dyn SettingsStore>, joiner: Box<dyn NetworkJoiner>) -> Self {
        Self { settings, joiner }
    }

    /// Try once to join. Nothing here is an error for the caller: missing
    /// credentials are skipped silently and a failed join waits for the next tick.
    pub fn attempt(&mut self, gate: &dyn ConnectivityGate) -> JoinAttempt {
        if gate.is_connected() {
            return JoinAttempt::AlreadyConnected;
        }

        let credentials = match WifiCredentials::load(self.settings.as_ref()) {
            Ok(Some(creds)) => creds,
            Ok(None) => {
                log::debug!("No WiFi credentials found");
                return JoinAttempt::NoCredentials;
            }
            Err(e) => {
                log::warn!("Failed to read WiFi credentials: {:?}", e);
                return JoinAttempt::NoCredentials;
            }
        };

        log::debug!("Starting WiFi autojoin to '{}'...", credentials.ssid);
        match self.joiner.join(&credentials) {
            Ok(()) => {
                log::info!("Joined WiFi network '{}'", credentials.ssid);
                JoinAttempt::Joined
            }
            Err(e) => {
                log::warn!("Failed to join WiFi network '{}': {:?}", credentials.ssid, e);
                JoinAttempt::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettings, SettingKey};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingJoiner {
        calls: Arc<AtomicU32>,
        succeed: bool,
    }

    impl NetworkJoiner for CountingJoiner {
        fn join(&mut self, _credentials: &WifiCredentials) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                anyhow::bail!("association timed out")
            }
        }
    }

    fn autojoin(settings: MemorySettings, succeed: bool) -> (AutoJoin, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let joiner = CountingJoiner {
            calls: calls.clone(),
            succeed,
        };
        (AutoJoin::new(Box::new(settings), Box::new(joiner)), calls)
    }

    fn with_creds() -> MemorySettings {
        MemorySettings::new()
            .with(SettingKey::WifiSsid, "home")
            .with(SettingKey::WifiPassword, "hunter22")
    }

    #[test]
    fn test_closure_gate() {
        let gate = || true;
        assert!(gate.is_connected());
    }

    #[test]
    fn test_skips_when_connected() {
        let (mut join, calls) = autojoin(with_creds(), true);
        assert_eq!(join.attempt(&|| true), JoinAttempt::AlreadyConnected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_skips_silently_without_credentials() {
        let (mut join, calls) = autojoin(MemorySettings::new(), true);
        assert_eq!(join.attempt(&|| false), JoinAttempt::NoCredentials);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_join_is_attempted_once() {
        let (mut join, calls) = autojoin(with_creds(), false);
        assert_eq!(join.attempt(&|| false), JoinAttempt::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_join_success() {
        let (mut join, _) = autojoin(with_creds(), true);
        assert_eq!(join.attempt(&|| false), JoinAttempt::Joined);
    }
}
