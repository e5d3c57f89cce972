//! Display sink for the current readings.

use crate::device::on_off;
use crate::network::ConnectionMode;
use crate::sensors::SensorSample;
use log::info;

/// Device status shown next to the readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayStatus {
    /// Network mode.
    pub mode: ConnectionMode,
    /// Broker session up.
    pub messaging_connected: bool,
    /// Pump output.
    pub pump_on: bool,
    /// Automatic irrigation enabled.
    pub auto_irrigation: bool,
}

/// Somewhere to show readings. Rendering never fails the caller.
pub trait DisplaySink {
    /// Show the latest sample and status.
    fn render(&mut self, sample: &SensorSample, status: &DisplayStatus);
}

/// Display that writes a one-line summary to the log.
#[derive(Debug, Default)]
pub struct LogDisplay {
    frames: u64,
}

impl LogDisplay {
    /// Create a log display.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

fn field<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "--".to_string(), |v| v.to_string())
}

/// One-line rendering of a sample.
pub fn summary(sample: &SensorSample, status: &DisplayStatus) -> String {
    format!(
        "T={}C H={}% soil={}% light={} water={}% pump={} auto={} net={:?} mqtt={}",
        field(sample.valid_temperature().map(|t| format!("{:.1}", t))),
        field(sample.valid_air_humidity().map(|h| format!("{:.1}", h))),
        field(sample.valid_soil_moisture().map(|m| format!("{:.0}", m))),
        field(sample.valid_light()),
        field(sample.valid_water_level()),
        on_off(status.pump_on),
        on_off(status.auto_irrigation),
        status.mode,
        on_off(status.messaging_connected),
    )
}

impl DisplaySink for LogDisplay {
    fn render(&mut self, sample: &SensorSample, status: &DisplayStatus) {
        self.frames += 1;
        info!("{}", summary(sample, status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_marks_missing_readings() {
        let sample = SensorSample {
            temperature: None,
            air_humidity: Some(51.24),
            soil_moisture_pct: 38.4,
            light_raw: 900,
            water_level_pct: 120,
        };
        let status = DisplayStatus {
            mode: ConnectionMode::StationConnected,
            messaging_connected: true,
            pump_on: true,
            auto_irrigation: true,
        };
        let line = summary(&sample, &status);
        assert!(line.starts_with("T=--C H=51.2% soil=38% light=900 water=--%"));
        assert!(line.contains("pump=ON"));
        assert!(line.contains("net=StationConnected"));
    }

    #[test]
    fn test_log_display_counts_frames() {
        let mut display = LogDisplay::new();
        let sample = SensorSample {
            temperature: None,
            air_humidity: None,
            soil_moisture_pct: 50.0,
            light_raw: 0,
            water_level_pct: 0,
        };
        let status = DisplayStatus {
            mode: ConnectionMode::ProvisioningAP,
            messaging_connected: false,
            pump_on: false,
            auto_irrigation: false,
        };
        display.render(&sample, &status);
        display.render(&sample, &status);
        assert_eq!(display.frames(), 2);
    }
}
