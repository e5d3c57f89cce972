//! WiFi driver abstraction.
//!
//! The network manager talks to the radio through [`WifiDriver`], which
//! covers station join, access point hosting and scanning.
//!
//! # Components
//!
//! - [`connection`] - ESP-IDF WiFi driver wrapper (ESP32 only)
//! - [`host`] - OS networking stand-in for host builds

#[cfg(feature = "esp32")]
mod connection;
#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
pub use connection::EspWifiDriver;
#[cfg(not(feature = "esp32"))]
pub use host::HostWifi;

use crate::config::{AccessPointConfig, NetworkIdentity};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// A network seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    /// Network name.
    pub ssid: String,
    /// Signal strength in dBm, when the driver reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i8>,
}

impl ScanEntry {
    /// Entry with a name only.
    pub fn named(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            rssi: None,
        }
    }
}

/// Radio operations used by the network manager.
pub trait WifiDriver {
    /// Configure station mode with `identity` and start associating.
    ///
    /// Must not block until the association completes; progress is observed
    /// through [`WifiDriver::is_connected`].
    fn begin_station(&mut self, identity: &NetworkIdentity) -> Result<(), WifiError>;

    /// Poll the station link (associated and address assigned).
    fn is_connected(&mut self) -> bool;

    /// Address assigned to the station interface.
    fn station_address(&self) -> Option<IpAddr>;

    /// Abandon a station attempt.
    fn stop_station(&mut self) -> Result<(), WifiError>;

    /// Host the provisioning access point. Returns the device address on it.
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, WifiError>;

    /// Scan for nearby networks.
    fn scan(&mut self) -> Result<Vec<ScanEntry>, WifiError>;
}

/// Check that `address` can be assigned to the access point interface.
pub fn check_ap_address(address: Ipv4Addr) -> Result<(), WifiError> {
    if address.is_unspecified()
        || address.is_broadcast()
        || address.is_multicast()
        || address.is_loopback()
    {
        return Err(WifiError::InvalidAddress(address));
    }
    Ok(())
}

/// Errors that can occur during WiFi operations.
#[derive(Debug)]
pub enum WifiError {
    /// Network name rejected by the driver.
    InvalidName,
    /// Secret rejected by the driver.
    InvalidSecret,
    /// Address cannot be used for the access point.
    InvalidAddress(Ipv4Addr),
    /// Operation not available on this platform.
    Unsupported(&'static str),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    EspError(esp_idf_sys::EspError),
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for WifiError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::EspError(e)
    }
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "invalid network name"),
            Self::InvalidSecret => write!(f, "invalid secret"),
            Self::InvalidAddress(a) => write!(f, "invalid access point address {}", a),
            Self::Unsupported(what) => write!(f, "unsupported: {}", what),
            #[cfg(feature = "esp32")]
            Self::EspError(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for WifiError {}
