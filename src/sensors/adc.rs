//! ADC-backed sensors (ESP32 only).
//!
//! Soil moisture, water level and light are analog sensors on ADC1. The
//! climate sensor is not wired through this reader; temperature and air
//! humidity are reported as absent.

use super::{soil_moisture_from_raw, water_level_from_raw, SensorSample, SensorSource};
use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::gpio::{Gpio32, Gpio34, Gpio35};
use esp_idf_sys::EspError;
use log::warn;
use std::sync::Arc;

type Adc1 = Arc<AdcDriver<'static, ADC1>>;

/// Analog sensors on the greenhouse board.
pub struct AdcSensors {
    soil: AdcChannelDriver<'static, Gpio34, Adc1>,
    water: AdcChannelDriver<'static, Gpio35, Adc1>,
    light: AdcChannelDriver<'static, Gpio32, Adc1>,
}

impl AdcSensors {
    /// Take ADC1 and the three sensor pins.
    pub fn new(adc1: ADC1, soil: Gpio34, water: Gpio35, light: Gpio32) -> Result<Self, EspError> {
        let adc = Arc::new(AdcDriver::new(adc1)?);
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        Ok(Self {
            soil: AdcChannelDriver::new(adc.clone(), soil, &config)?,
            water: AdcChannelDriver::new(adc.clone(), water, &config)?,
            light: AdcChannelDriver::new(adc, light, &config)?,
        })
    }
}

fn log_failure(sensor: &str, e: EspError) {
    warn!("{} sensor read failed: {:?}", sensor, e);
}

impl SensorSource for AdcSensors {
    fn sample(&mut self) -> SensorSample {
        let soil = self
            .soil
            .read_raw()
            .map(soil_moisture_from_raw)
            .unwrap_or_else(|e| {
                log_failure("Soil", e);
                f32::NAN
            });
        let water = self
            .water
            .read_raw()
            .map(water_level_from_raw)
            .unwrap_or_else(|e| {
                log_failure("Water", e);
                -1
            });
        let light = self.light.read_raw().map(i32::from).unwrap_or_else(|e| {
            log_failure("Light", e);
            -1
        });

        SensorSample {
            temperature: None,
            air_humidity: None,
            soil_moisture_pct: soil,
            light_raw: light,
            water_level_pct: water,
        }
    }
}
