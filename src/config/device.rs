//! Device tunables.
//!
//! Platform-independent configuration for the broker endpoint, scheduler
//! cadence, irrigation thresholds and the provisioning access point.

use log::warn;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Public broker used by the greenhouse dashboard.
pub const DEFAULT_BROKER_HOST: &str = "broker.hivemq.com";

/// Plain MQTT port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Client identifier announced to the broker.
pub const DEFAULT_CLIENT_ID: &str = "ESP32ClientInvernadero";

/// Station join: status polls before falling back to provisioning.
pub const JOIN_ATTEMPTS: u32 = 30;

/// Station join: delay between status polls.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between broker connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Sensor poll period.
pub const POLL_PERIOD: Duration = Duration::from_secs(5);

/// Soil moisture below which irrigation starts (percent).
pub const LOW_THRESHOLD: f32 = 40.0;

/// Soil moisture at or above which irrigation stops (percent).
pub const HIGH_THRESHOLD: f32 = 70.0;

/// Provisioning access point name.
pub const AP_NAME: &str = "ESP32_Config";

/// Provisioning access point secret.
pub const AP_SECRET: &str = "config123";

/// Fixed address of the device while it hosts the access point.
pub const AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Port the provisioning portal listens on.
pub const DEFAULT_PORTAL_PORT: u16 = 80;

/// MQTT broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Client identifier.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
}

impl BrokerConfig {
    /// Get the address string for connection (host:port).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the URL form used by the ESP-IDF client.
    pub fn url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            keep_alive: Duration::from_secs(15),
        }
    }
}

/// Bounded station-join policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPolicy {
    /// Number of status polls.
    pub attempts: u32,
    /// Delay between polls.
    pub interval: Duration,
}

impl JoinPolicy {
    /// Worst-case time spent joining.
    pub fn timeout(&self) -> Duration {
        self.interval * self.attempts
    }
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            attempts: JOIN_ATTEMPTS,
            interval: JOIN_POLL_INTERVAL,
        }
    }
}

/// Hysteresis thresholds in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Start irrigating strictly below this value.
    pub low: f32,
    /// Stop irrigating at or above this value.
    pub high: f32,
}

impl Thresholds {
    /// Create thresholds, checking `0 <= low < high <= 100`.
    pub fn new(low: f32, high: f32) -> Result<Self, DeviceConfigError> {
        let in_range = |v: f32| (0.0..=100.0).contains(&v);
        if !in_range(low) || !in_range(high) || low >= high {
            return Err(DeviceConfigError::InvalidThresholds { low, high });
        }
        Ok(Self { low, high })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: LOW_THRESHOLD,
            high: HIGH_THRESHOLD,
        }
    }
}

/// Fixed provisioning access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    /// Advertised network name.
    pub name: String,
    /// WPA2 secret.
    pub secret: String,
    /// Address of the device on the access point network.
    pub address: Ipv4Addr,
    /// Portal HTTP port.
    pub portal_port: u16,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            name: AP_NAME.to_string(),
            secret: AP_SECRET.to_string(),
            address: AP_ADDRESS,
            portal_port: DEFAULT_PORTAL_PORT,
        }
    }
}

/// All device tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Broker endpoint.
    pub broker: BrokerConfig,
    /// Station join policy.
    pub join: JoinPolicy,
    /// Delay between broker connection attempts.
    pub reconnect_delay: Duration,
    /// Sensor poll period.
    pub poll_period: Duration,
    /// Irrigation thresholds.
    pub thresholds: Thresholds,
    /// Provisioning access point.
    pub access_point: AccessPointConfig,
}

impl DeviceConfig {
    /// Defaults matching the deployed firmware.
    pub fn new() -> Self {
        Self {
            broker: BrokerConfig::default(),
            join: JoinPolicy::default(),
            reconnect_delay: RECONNECT_DELAY,
            poll_period: POLL_PERIOD,
            thresholds: Thresholds::default(),
            access_point: AccessPointConfig::default(),
        }
    }

    /// Defaults overridden by `GREENHOUSE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(host) = lookup("GREENHOUSE_BROKER_HOST").filter(|h| !h.trim().is_empty()) {
            config.broker.host = host.trim().to_string();
        }
        if let Some(port) = parse_var(&lookup, "GREENHOUSE_BROKER_PORT") {
            config.broker.port = port;
        }
        if let Some(id) = lookup("GREENHOUSE_CLIENT_ID").filter(|id| !id.trim().is_empty()) {
            config.broker.client_id = id.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "GREENHOUSE_POLL_SECS") {
            if secs > 0 {
                config.poll_period = Duration::from_secs(secs);
            } else {
                warn!("Ignoring GREENHOUSE_POLL_SECS=0");
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "GREENHOUSE_RECONNECT_SECS") {
            config.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(port) = parse_var(&lookup, "GREENHOUSE_PORTAL_PORT") {
            config.access_point.portal_port = port;
        }

        let low = parse_var(&lookup, "GREENHOUSE_LOW_THRESHOLD").unwrap_or(config.thresholds.low);
        let high =
            parse_var(&lookup, "GREENHOUSE_HIGH_THRESHOLD").unwrap_or(config.thresholds.high);
        match Thresholds::new(low, high) {
            Ok(thresholds) => config.thresholds = thresholds,
            Err(e) => warn!("Ignoring threshold override: {}", e),
        }

        config
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceConfigError {
    /// Thresholds out of range or not ordered.
    InvalidThresholds { low: f32, high: f32 },
}

impl std::fmt::Display for DeviceConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidThresholds { low, high } => write!(
                f,
                "invalid thresholds: low {} high {} (need 0 <= low < high <= 100)",
                low, high
            ),
        }
    }
}

impl std::error::Error for DeviceConfigError {}
