// Centralized version information

// Cargo package version, also reported to the update backend as the running version
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const FIRMWARE_NAME: &str = env!("CARGO_PKG_NAME");

// Full version string for the boot banner
pub fn full_version() -> String {
    format!("{} v{}", FIRMWARE_NAME, FIRMWARE_VERSION)
}
