/// Settings store contract (NVS on the device) and the values read from it
use anyhow::Result;
use std::collections::HashMap;

/// Longest SSID or passphrase accepted for auto-join
pub const MAX_CREDENTIAL_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    WifiSsid,
    WifiPassword,
    ProjectKey,
    ChunksUrl,
    DeviceUrl,
}

impl SettingKey {
    /// Key name as stored in the settings namespace
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::WifiSsid => "wifi_ssid",
            SettingKey::WifiPassword => "wifi_password",
            SettingKey::ProjectKey => "project_key",
            SettingKey::ChunksUrl => "chunks_url",
            SettingKey::DeviceUrl => "device_url",
        }
    }
}

/// Key/value read access. A missing key is `Ok(None)`, never an error.
pub trait SettingsStore: Send {
    fn get(&self, key: SettingKey) -> Result<Option<String>>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &if self.password.is_empty() { "<empty>" } else { "<set>" })
            .finish()
    }
}

impl WifiCredentials {
    /// Load stored credentials, returning `None` if either half is absent,
    /// empty, or too long to be a real SSID/passphrase.
    pub fn load(store: &dyn SettingsStore) -> Result<Option<Self>> {
        let ssid = store.get(SettingKey::WifiSsid)?;
        let password = store.get(SettingKey::WifiPassword)?;

        let usable = |v: &Option<String>| {
            v.as_deref()
                .map(|s| !s.is_empty() && s.len() <= MAX_CREDENTIAL_LEN)
                .unwrap_or(false)
        };
        if !usable(&ssid) || !usable(&password) {
            return Ok(None);
        }

        Ok(ssid.zip(password).map(|(ssid, password)| Self { ssid, password }))
    }
}

/// Optional overrides for the update backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub project_key: Option<String>,
    pub chunks_host: Option<String>,
    pub device_host: Option<String>,
}

impl BackendConfig {
    /// Read the project key and host overrides. Read failures are logged and
    /// treated as "not configured". Host overrides are only taken when both
    /// URL reads succeed, so the device never talks to a mixed pair.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        let project_key = match store.get(SettingKey::ProjectKey) {
            Ok(v) => non_empty(v),
            Err(e) => {
                log::warn!("Failed to read project key: {:?}", e);
                None
            }
        };

        let (chunks_host, device_host) = match (
            store.get(SettingKey::ChunksUrl),
            store.get(SettingKey::DeviceUrl),
        ) {
            (Ok(chunks), Ok(device)) => (non_empty(chunks), non_empty(device)),
            (chunks, device) => {
                if let Err(e) = chunks {
                    log::warn!("Failed to read chunks URL: {:?}", e);
                }
                if let Err(e) = device {
                    log::warn!("Failed to read device URL: {:?}", e);
                }
                (None, None)
            }
        };

        Self {
            project_key,
            chunks_host,
            device_host,
        }
    }
}

/// In-memory settings, used by the host simulation and tests
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: HashMap<SettingKey, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: SettingKey, value: &str) -> Self {
        self.values.insert(key, value.to_string());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: SettingKey) -> Result<Option<String>> {
        Ok(self.values.get(&key).cloned())
    }
}
