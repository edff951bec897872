pub mod ota;
pub mod wifi;
