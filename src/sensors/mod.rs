//! Sensor sampling, calibration and telemetry.
//!
//! A [`SensorSource`] produces one [`SensorSample`] per poll cycle. Readings
//! a driver could not take, or that fall outside their physical range, are
//! left out of the telemetry rather than published as garbage.

#[cfg(feature = "esp32")]
mod adc;
mod simulated;

#[cfg(feature = "esp32")]
pub use adc::AdcSensors;
pub use simulated::{SimulatedActuators, SimulatedSensors};

use crate::messaging::topics::{self, Outbound};

/// Full scale of a 12-bit ADC reading.
pub const ADC_MAX: u16 = 4095;

/// Raw soil sensor reading in dry soil.
pub const SOIL_DRY_RAW: u16 = 4095;

/// Raw soil sensor reading in saturated soil.
pub const SOIL_WET_RAW: u16 = 1500;

/// One poll cycle's readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Air temperature in °C.
    pub temperature: Option<f32>,
    /// Relative air humidity in %.
    pub air_humidity: Option<f32>,
    /// Soil moisture in % (0..=100 when valid).
    pub soil_moisture_pct: f32,
    /// Raw light level (0..=4095 when valid).
    pub light_raw: i32,
    /// Water tank level in % (0..=100 when valid).
    pub water_level_pct: i32,
}

impl SensorSample {
    /// Soil moisture, if it is a usable percentage.
    pub fn valid_soil_moisture(&self) -> Option<f32> {
        Some(self.soil_moisture_pct).filter(|m| m.is_finite() && (0.0..=100.0).contains(m))
    }

    /// Air temperature, if the sensor produced a plausible value.
    pub fn valid_temperature(&self) -> Option<f32> {
        self.temperature
            .filter(|t| t.is_finite() && (-40.0..=80.0).contains(t))
    }

    /// Air humidity, if the sensor produced a plausible value.
    pub fn valid_air_humidity(&self) -> Option<f32> {
        self.air_humidity
            .filter(|h| h.is_finite() && (0.0..=100.0).contains(h))
    }

    /// Light level, if in ADC range.
    pub fn valid_light(&self) -> Option<i32> {
        Some(self.light_raw).filter(|l| (0..=i32::from(ADC_MAX)).contains(l))
    }

    /// Water level, if a percentage.
    pub fn valid_water_level(&self) -> Option<i32> {
        Some(self.water_level_pct).filter(|w| (0..=100).contains(w))
    }

    /// Telemetry messages for every valid reading.
    pub fn telemetry(&self) -> Vec<Outbound> {
        let mut out = Vec::with_capacity(5);
        if let Some(t) = self.valid_temperature() {
            out.push(Outbound::new(topics::TEMPERATURE, format!("{:.1}", t)));
        }
        if let Some(h) = self.valid_air_humidity() {
            out.push(Outbound::new(topics::AIR_HUMIDITY, format!("{:.1}", h)));
        }
        if let Some(m) = self.valid_soil_moisture() {
            out.push(Outbound::new(topics::SOIL_MOISTURE, format!("{:.0}", m)));
        }
        if let Some(l) = self.valid_light() {
            out.push(Outbound::new(topics::LIGHT, l.to_string()));
        }
        if let Some(w) = self.valid_water_level() {
            out.push(Outbound::new(topics::WATER_LEVEL, w.to_string()));
        }
        out
    }
}

/// Source of sensor samples.
pub trait SensorSource {
    /// Take one sample. Must not fail; unreadable values are marked invalid.
    fn sample(&mut self) -> SensorSample;
}

/// Map a raw soil sensor reading to a moisture percentage.
///
/// Dry (4095) is 0 %, wet (1500) is 100 %, clamped in between.
pub fn soil_moisture_from_raw(raw: u16) -> f32 {
    let span = f32::from(SOIL_DRY_RAW - SOIL_WET_RAW);
    let pct = (f32::from(SOIL_DRY_RAW) - f32::from(raw)) / span * 100.0;
    pct.clamp(0.0, 100.0)
}

/// Map a raw level sensor reading linearly onto 0..=100 %.
pub fn water_level_from_raw(raw: u16) -> i32 {
    let raw = u32::from(raw.min(ADC_MAX));
    (raw * 100 / u32::from(ADC_MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_sample() -> SensorSample {
        SensorSample {
            temperature: Some(21.46),
            air_humidity: Some(55.04),
            soil_moisture_pct: 42.6,
            light_raw: 1234,
            water_level_pct: 80,
        }
    }

    // ==================== Calibration Tests ====================

    #[test]
    fn test_soil_calibration_endpoints() {
        assert_eq!(soil_moisture_from_raw(4095), 0.0);
        assert_eq!(soil_moisture_from_raw(1500), 100.0);
        assert_eq!(soil_moisture_from_raw(0), 100.0);
        let mid = soil_moisture_from_raw(2797);
        assert!((mid - 50.0).abs() < 0.1, "got {}", mid);
    }

    #[test]
    fn test_water_level_calibration() {
        assert_eq!(water_level_from_raw(0), 0);
        assert_eq!(water_level_from_raw(4095), 100);
        assert_eq!(water_level_from_raw(2048), 50);
        assert_eq!(water_level_from_raw(u16::MAX), 100);
    }

    // ==================== Telemetry Tests ====================

    #[test]
    fn test_telemetry_formats() {
        let msgs = good_sample().telemetry();
        let pairs: Vec<(&str, &str)> = msgs
            .iter()
            .map(|m| (m.topic, m.payload.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (topics::TEMPERATURE, "21.5"),
                (topics::AIR_HUMIDITY, "55.0"),
                (topics::SOIL_MOISTURE, "43"),
                (topics::LIGHT, "1234"),
                (topics::WATER_LEVEL, "80"),
            ]
        );
    }

    #[test]
    fn test_invalid_readings_omitted() {
        let sample = SensorSample {
            temperature: None,
            air_humidity: Some(f32::NAN),
            soil_moisture_pct: 140.0,
            light_raw: -1,
            water_level_pct: 101,
        };
        assert!(sample.telemetry().is_empty());
    }

    #[test]
    fn test_partial_telemetry() {
        let sample = SensorSample {
            temperature: None,
            ..good_sample()
        };
        let topics_sent: Vec<&str> = sample.telemetry().iter().map(|m| m.topic).collect();
        assert!(!topics_sent.contains(&topics::TEMPERATURE));
        assert_eq!(topics_sent.len(), 4);
    }

    #[test]
    fn test_valid_soil_moisture() {
        let mut sample = good_sample();
        assert_eq!(sample.valid_soil_moisture(), Some(42.6));
        sample.soil_moisture_pct = f32::NAN;
        assert_eq!(sample.valid_soil_moisture(), None);
        sample.soil_moisture_pct = -0.5;
        assert_eq!(sample.valid_soil_moisture(), None);
    }
}
