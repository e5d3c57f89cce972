//! Host WiFi stand-in.
//!
//! On host systems, the OS handles networking. Station "joins" succeed as
//! soon as a local address can be determined, and the provisioning access
//! point is emulated by serving the portal on the loopback interface.

use super::{check_ap_address, ScanEntry, WifiDriver, WifiError};
use crate::config::{AccessPointConfig, NetworkIdentity};
use log::info;
use std::net::{IpAddr, Ipv4Addr};

/// Host WiFi driver.
#[derive(Debug, Default)]
pub struct HostWifi {
    ip_addr: Option<IpAddr>,
    joined: bool,
}

impl HostWifi {
    /// Create a new host driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary local IP address.
    ///
    /// This uses a trick: create a UDP socket and "connect" to a public IP
    /// (doesn't actually send anything), then check which local address was chosen.
    fn detect_local_ip() -> Option<IpAddr> {
        use std::net::UdpSocket;

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }
}

impl WifiDriver for HostWifi {
    fn begin_station(&mut self, identity: &NetworkIdentity) -> Result<(), WifiError> {
        info!(
            "Host network stands in for '{}' (OS manages the link)",
            identity.name()
        );
        self.joined = true;
        self.ip_addr = Self::detect_local_ip();
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        // On host, assume we're connected once a join was requested
        self.joined
    }

    fn station_address(&self) -> Option<IpAddr> {
        if !self.joined {
            return None;
        }
        Some(self.ip_addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
    }

    fn stop_station(&mut self) -> Result<(), WifiError> {
        self.joined = false;
        self.ip_addr = None;
        Ok(())
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, WifiError> {
        check_ap_address(config.address)?;
        info!(
            "Host cannot host '{}', portal will be served on localhost",
            config.name
        );
        Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, WifiError> {
        info!("Host scan: no radio, reporting no networks");
        Ok(Vec::new())
    }
}
