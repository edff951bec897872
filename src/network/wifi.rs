use anyhow::{anyhow, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};
use std::sync::{Arc, Mutex};

use supervisor_core::settings::WifiCredentials;
use supervisor_core::{ConnectivityGate, NetworkJoiner};

pub struct WifiManager {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl WifiManager {
    /// Bring the station interface up unconfigured; joining happens later from
    /// stored credentials.
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        wifi.start()?;

        log::info!("WiFi station started");
        Ok(Self { wifi })
    }

    pub fn connect(&mut self, credentials: &WifiCredentials) -> Result<()> {
        let cfg = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Invalid SSID format: {}", credentials.ssid))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Invalid password format"))?,
            auth_method: if credentials.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        self.wifi.set_configuration(&cfg)?;

        log::info!("Connecting to {}...", credentials.ssid);
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        log::info!("WiFi connected, IP: {}", ip_info.ip);
        Ok(())
    }

    /// Associated and holding an address
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }
}

pub type SharedWifi = Arc<Mutex<WifiManager>>;

/// Connectivity as seen by the update task
pub struct WifiGate(pub SharedWifi);

impl ConnectivityGate for WifiGate {
    fn is_connected(&self) -> bool {
        match self.0.lock() {
            Ok(wifi) => wifi.is_connected(),
            Err(_) => false,
        }
    }
}

pub struct WifiJoiner(pub SharedWifi);

impl NetworkJoiner for WifiJoiner {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<()> {
        let mut wifi = self
            .0
            .lock()
            .map_err(|_| anyhow!("WiFi manager lock poisoned"))?;
        wifi.connect(credentials)
    }
}
