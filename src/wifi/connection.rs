//! ESP-IDF WiFi driver wrapper.
//!
//! Wraps `EspWifi` for non-blocking station joins, the provisioning access
//! point and network scans.

use super::{check_ap_address, ScanEntry, WifiDriver, WifiError};
use crate::config::{AccessPointConfig, NetworkIdentity};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4::{
    Configuration as IpConfiguration, Mask, RouterConfiguration, Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
    EspWifi,
};
use log::{info, warn};
use std::net::{IpAddr, Ipv4Addr};

/// Prefix length of the provisioning network.
const AP_PREFIX_LEN: u8 = 24;

/// ESP32 WiFi driver.
pub struct EspWifiDriver<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> EspWifiDriver<'a> {
    /// Create a new WiFi driver.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, WifiError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self { wifi })
    }
}

impl<'a> EspWifiDriver<'a> {
    /// Give the access point interface `address`, serving DHCP to clients
    /// on its /24.
    fn configure_ap_netif(&mut self, address: Ipv4Addr) -> Result<(), WifiError> {
        check_ap_address(address)?;
        let mut conf = NetifConfiguration::wifi_default_router();
        conf.key = "WIFI_AP_PORTAL"
            .try_into()
            .map_err(|_| WifiError::Unsupported("netif key"))?;
        conf.ip_configuration = Some(IpConfiguration::Router(RouterConfiguration {
            subnet: Subnet {
                gateway: address,
                mask: Mask(AP_PREFIX_LEN),
            },
            dhcp_enabled: true,
            dns: Some(address),
            secondary_dns: None,
        }));

        let netif = EspNetif::new_with_conf(&conf)?;
        self.wifi.wifi_mut().swap_netif_ap(netif)?;
        Ok(())
    }
}

impl<'a> WifiDriver for EspWifiDriver<'a> {
    fn begin_station(&mut self, identity: &NetworkIdentity) -> Result<(), WifiError> {
        info!("Connecting to WiFi: {}", identity.name());

        let auth_method = if identity.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: identity
                .name()
                .try_into()
                .map_err(|_| WifiError::InvalidName)?,
            password: identity
                .secret()
                .try_into()
                .map_err(|_| WifiError::InvalidSecret)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        self.wifi.start()?;

        // Non-blocking: progress is polled through is_connected()
        self.wifi.wifi_mut().connect()?;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn station_address(&self) -> Option<IpAddr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| IpAddr::V4(info.ip))
    }

    fn stop_station(&mut self) -> Result<(), WifiError> {
        info!("Abandoning station join");
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi disconnect failed: {:?}", e);
        }
        self.wifi.stop()?;
        Ok(())
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, WifiError> {
        let ap = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: config
                .name
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidName)?,
            password: config
                .secret
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidSecret)?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        });

        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        self.configure_ap_netif(config.address)?;
        self.wifi.set_configuration(&ap)?;
        self.wifi.start()?;
        self.wifi.wait_netif_up()?;

        let ip_info = self.wifi.wifi().ap_netif().get_ip_info()?;
        if ip_info.ip != config.address {
            warn!(
                "Access point came up at {} instead of {}",
                ip_info.ip, config.address
            );
        }
        info!("Access point '{}' up at {}", config.name, ip_info.ip);
        Ok(IpAddr::V4(ip_info.ip))
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, WifiError> {
        let found = self.wifi.scan()?;
        Ok(found
            .into_iter()
            .map(|ap| ScanEntry {
                ssid: ap.ssid.to_string(),
                rssi: Some(ap.signal_strength),
            })
            .collect())
    }
}
