//! Fixed topic names and outbound message type.
//!
//! Topic strings are shared with the greenhouse dashboard and must match
//! exactly.

/// Identity update (in): `{"ssid": "...", "password": "..."}`.
pub const IDENTITY_UPDATE: &str = "invernadero/config/wifi";

/// Connection status (out): free text.
pub const CONNECTION_STATUS: &str = "invernadero/status/wifi_connect";

/// Scan request (in): literal `"1"`.
pub const SCAN_COMMAND: &str = "invernadero/wifi/scan_command";

/// Scan results (out): JSON array.
pub const SCAN_RESULTS: &str = "invernadero/wifi/scan_results";

/// Air temperature in °C (out).
pub const TEMPERATURE: &str = "invernadero/temperatura";

/// Relative air humidity in % (out).
pub const AIR_HUMIDITY: &str = "invernadero/humedad_aire";

/// Soil moisture in % (out).
pub const SOIL_MOISTURE: &str = "invernadero/humedad_suelo";

/// Raw light level (out).
pub const LIGHT: &str = "invernadero/luz";

/// Water tank level in % (out).
pub const WATER_LEVEL: &str = "invernadero/nivel_agua";

/// Pump control (in): `"ON"` / `"OFF"`.
pub const PUMP_CONTROL: &str = "invernadero/control_bomba";

/// Pump status (out): `"ON"` / `"OFF"`.
pub const PUMP_STATUS: &str = "invernadero/bomba_estado";

/// Alert indicator control (in): `"ON"` / `"OFF"`.
pub const ALERT_CONTROL: &str = "invernadero/control_led_alerta";

/// Alert indicator status (out): `"ON"` / `"OFF"`.
///
/// The dashboard reads the alert state back from [`ALERT_CONTROL`] itself.
/// The device keeps a separate status topic because anything it published on
/// a subscribed command topic would come back through dispatch.
pub const ALERT_STATUS: &str = "invernadero/led_alerta_estado";

/// Automatic irrigation control (in): `"ON"` / `"OFF"`.
pub const AUTO_IRRIGATION_CONTROL: &str = "invernadero/control_riego_auto_sensor";

/// Automatic irrigation status (out): `"ON"` / `"OFF"`.
pub const AUTO_IRRIGATION_STATUS: &str = "invernadero/status/riego_auto_sensor";

/// Every topic the device subscribes to.
pub const COMMAND_TOPICS: [&str; 5] = [
    IDENTITY_UPDATE,
    SCAN_COMMAND,
    PUMP_CONTROL,
    ALERT_CONTROL,
    AUTO_IRRIGATION_CONTROL,
];

/// A message waiting to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Destination topic.
    pub topic: &'static str,
    /// UTF-8 payload.
    pub payload: String,
}

impl Outbound {
    /// Create a message.
    pub fn new(topic: &'static str, payload: impl Into<String>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }

    /// Connection status message.
    pub fn status(text: impl Into<String>) -> Self {
        Self::new(CONNECTION_STATUS, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_topics_unique() {
        for (i, a) in COMMAND_TOPICS.iter().enumerate() {
            for b in &COMMAND_TOPICS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_status_topics_not_subscribed() {
        for status in [
            CONNECTION_STATUS,
            SCAN_RESULTS,
            PUMP_STATUS,
            ALERT_STATUS,
            AUTO_IRRIGATION_STATUS,
        ] {
            assert!(!COMMAND_TOPICS.contains(&status));
        }
    }

    #[test]
    fn test_status_helper() {
        let msg = Outbound::status("CONECTADO OK: 10.0.0.2");
        assert_eq!(msg.topic, CONNECTION_STATUS);
        assert_eq!(msg.payload, "CONECTADO OK: 10.0.0.2");
    }
}
