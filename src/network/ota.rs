//! Update backend client for the device build
//!
//! Phase one fetches a small JSON manifest describing the latest release and
//! compares it against the running version. Phase two streams the image into
//! the inactive OTA slot; `EspOta` marks it bootable on completion.

use anyhow::{bail, Result};
use embedded_svc::http::client::Client;
use embedded_svc::http::Method;
use embedded_svc::io::Read;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
use esp_idf_svc::ota::EspOta;
use serde::Deserialize;
use std::time::Duration;

use supervisor_core::settings::BackendConfig;
use supervisor_core::{CheckPhase, DownloadResult, PendingUpdate, UpdateCheck};

use crate::version::FIRMWARE_VERSION;

const DEFAULT_DEVICE_HOST: &str = "ota.local";
const MANIFEST_PATH: &str = "/firmware/latest.json";
const MAX_MANIFEST_SIZE: usize = 2048;

// Negative codes reported through telemetry
pub const ERR_MANIFEST_FETCH: i32 = -1;
pub const ERR_MANIFEST_PARSE: i32 = -2;
pub const ERR_DOWNLOAD: i32 = -3;

#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    version: String,
    url: String,
    #[serde(default)]
    size: Option<usize>,
}

pub struct HttpUpdateClient {
    backend: BackendConfig,
}

impl HttpUpdateClient {
    pub fn new(backend: BackendConfig) -> Self {
        if let Some(host) = &backend.device_host {
            log::info!("Using update backend override: {}", host);
        }
        Self { backend }
    }

    fn manifest_url(&self) -> String {
        let host = self.backend.device_host.as_deref().unwrap_or(DEFAULT_DEVICE_HOST);
        format!(
            "http://{}{}?current_version={}",
            host, MANIFEST_PATH, FIRMWARE_VERSION
        )
    }

    fn connection(timeout_secs: u64) -> Result<Client<EspHttpConnection>> {
        let config = HttpConfig {
            buffer_size: Some(4096),
            timeout: Some(Duration::from_secs(timeout_secs)),
            ..Default::default()
        };
        Ok(Client::wrap(EspHttpConnection::new(&config)?))
    }

    fn fetch_manifest(&self) -> Result<Vec<u8>> {
        let mut client = Self::connection(30)?;
        let url = self.manifest_url();

        let mut headers = vec![("accept", "application/json")];
        if let Some(key) = &self.backend.project_key {
            headers.push(("x-project-key", key.as_str()));
        }

        let request = client.request(Method::Get, &url, &headers)?;
        let mut response = request.submit()?;
        if response.status() != 200 {
            bail!("Failed to fetch manifest: HTTP {}", response.status());
        }

        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let bytes_read = response.read(&mut buf)?;
            if bytes_read == 0 {
                break;
            }
            body.extend_from_slice(&buf[..bytes_read]);
            if body.len() > MAX_MANIFEST_SIZE {
                bail!("Manifest larger than {} bytes", MAX_MANIFEST_SIZE);
            }
        }
        Ok(body)
    }

    fn download(&self, pending: &PendingUpdate) -> Result<usize> {
        let mut client = Self::connection(120)?;
        let request = client.request(Method::Get, &pending.url, &[])?;
        let mut response = request.submit()?;
        if response.status() != 200 {
            bail!("Failed to download firmware: HTTP {}", response.status());
        }

        let mut ota = EspOta::new()?;
        let mut update = ota.initiate_update()?;

        let mut buf = vec![0u8; 4096];
        let mut total_bytes = 0usize;
        let streamed: Result<()> = (|| {
            loop {
                let bytes_read = response.read(&mut buf)?;
                if bytes_read == 0 {
                    break;
                }
                update.write(&buf[..bytes_read])?;
                total_bytes += bytes_read;
            }
            if let Some(expected) = pending.size {
                if expected != total_bytes {
                    bail!("Size mismatch: expected {} bytes, got {}", expected, total_bytes);
                }
            }
            Ok(())
        })();

        match streamed {
            Ok(()) => {
                update.complete()?;
                Ok(total_bytes)
            }
            Err(e) => {
                if let Err(abort_err) = update.abort() {
                    log::warn!("Failed to abort OTA update: {:?}", abort_err);
                }
                Err(e)
            }
        }
    }
}

impl UpdateCheck for HttpUpdateClient {
    fn begin_update_check(&mut self) -> CheckPhase {
        let body = match self.fetch_manifest() {
            Ok(body) => body,
            Err(e) => {
                log::error!("Update check failed: {:?}", e);
                return CheckPhase::Failed(ERR_MANIFEST_FETCH);
            }
        };

        let manifest: ReleaseManifest = match serde_json::from_slice(&body) {
            Ok(m) => m,
            Err(e) => {
                log::error!("Invalid release manifest: {:?}", e);
                return CheckPhase::Failed(ERR_MANIFEST_PARSE);
            }
        };

        if manifest.version == FIRMWARE_VERSION {
            log::info!("Already running latest version: {}", FIRMWARE_VERSION);
            return CheckPhase::NoUpdate;
        }

        log::info!(
            "New version available: {} (current: {})",
            manifest.version,
            FIRMWARE_VERSION
        );
        CheckPhase::UpdateFound(PendingUpdate {
            version: manifest.version,
            url: manifest.url,
            size: manifest.size,
        })
    }

    fn complete_update_check(&mut self, pending: PendingUpdate) -> DownloadResult {
        match self.download(&pending) {
            Ok(total_bytes) => {
                log::info!("Firmware {} staged ({} bytes)", pending.version, total_bytes);
                DownloadResult::Downloaded
            }
            Err(e) => {
                log::error!("Firmware download failed: {:?}", e);
                DownloadResult::Failed(ERR_DOWNLOAD)
            }
        }
    }
}
