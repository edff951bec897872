use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use supervisor_core::settings::{SettingKey, SettingsStore, MAX_CREDENTIAL_LEN};
use supervisor_core::{RebootMarker, RebootMarkerStore, SupervisorConfig};

const SETTINGS_NAMESPACE: &str = "settings";
const SUPERVISOR_NAMESPACE: &str = "supervisor";
const CONFIG_KEY: &str = "config";
const MARKER_KEY: &str = "reboot";

const MAX_BLOB_SIZE: usize = 1024;

/// Credentials and backend overrides, provisioned into NVS by the factory tool
pub struct NvsSettings {
    nvs: EspNvs<NvsDefault>,
}

impl NvsSettings {
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self> {
        Ok(Self {
            nvs: EspNvs::new(partition, SETTINGS_NAMESPACE, true)?,
        })
    }
}

impl SettingsStore for NvsSettings {
    fn get(&self, key: SettingKey) -> Result<Option<String>> {
        // URLs can be longer than credentials
        let mut buf = [0u8; 4 * MAX_CREDENTIAL_LEN];
        let value = self.nvs.get_str(key.as_str(), &mut buf)?;
        Ok(value.map(str::to_string))
    }
}

pub fn load_or_default(partition: EspDefaultNvsPartition) -> Result<SupervisorConfig> {
    let mut nvs = EspNvs::new(partition, SUPERVISOR_NAMESPACE, true)?;

    match load_config(&nvs) {
        Ok(config) => {
            log::info!("Loaded configuration from NVS");
            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            let config = SupervisorConfig::default();

            // Save the defaults so the next boot reads a valid blob
            if let Err(save_err) = save_config(&mut nvs, &config) {
                log::warn!("Failed to save default config to NVS: {:?}", save_err);
            }
            Ok(config)
        }
    }
}

fn load_config(nvs: &EspNvs<NvsDefault>) -> Result<SupervisorConfig> {
    let mut buf = vec![0u8; MAX_BLOB_SIZE];
    let data = nvs
        .get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;
    SupervisorConfig::from_json(data)
}

fn save_config(nvs: &mut EspNvs<NvsDefault>, config: &SupervisorConfig) -> Result<()> {
    nvs.set_blob(CONFIG_KEY, &config.to_json()?)?;
    Ok(())
}

/// Reboot marker kept in NVS so it survives the restart it announces
pub struct NvsMarkerStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsMarkerStore {
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self> {
        Ok(Self {
            nvs: EspNvs::new(partition, SUPERVISOR_NAMESPACE, true)?,
        })
    }
}

impl RebootMarkerStore for NvsMarkerStore {
    fn store(&mut self, marker: &RebootMarker) -> Result<()> {
        self.nvs.set_blob(MARKER_KEY, &marker.to_json()?)?;
        Ok(())
    }

    fn take(&mut self) -> Result<Option<RebootMarker>> {
        let mut buf = [0u8; 128];
        let Some(data) = self.nvs.get_blob(MARKER_KEY, &mut buf)? else {
            return Ok(None);
        };
        let data = data.to_vec();

        // Consumed even if unreadable, so a bad marker is reported once
        self.nvs.remove(MARKER_KEY)?;
        Ok(Some(RebootMarker::from_json(&data)?))
    }
}
