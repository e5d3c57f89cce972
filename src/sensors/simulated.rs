//! Simulated greenhouse for host builds.
//!
//! Soil dries slowly and is wetted while the pump runs. The pump state is
//! fed back through [`SimulatedActuators`], which wraps the real output
//! driver.

use super::{SensorSample, SensorSource, ADC_MAX};
use crate::device::{Actuators, OutputState};
use rand_core::{OsRng, RngCore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Moisture lost per sample with the pump off (percent).
const DRYING_PER_SAMPLE: f32 = 1.5;

/// Moisture gained per sample with the pump on (percent).
const WETTING_PER_SAMPLE: f32 = 6.0;

/// Simulated sensors.
#[derive(Debug)]
pub struct SimulatedSensors {
    soil_moisture: f32,
    water_level: i32,
    pump: Arc<AtomicBool>,
}

impl SimulatedSensors {
    /// Start with the given soil moisture percentage.
    pub fn new(soil_moisture: f32) -> Self {
        Self {
            soil_moisture: soil_moisture.clamp(0.0, 100.0),
            water_level: 100,
            pump: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wrap an output driver so the simulation sees the pump.
    pub fn with_feedback<A: Actuators>(&self, inner: A) -> SimulatedActuators<A> {
        SimulatedActuators {
            inner,
            pump: self.pump.clone(),
        }
    }

    /// Current simulated moisture.
    pub fn soil_moisture(&self) -> f32 {
        self.soil_moisture
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new(50.0)
    }
}

/// Uniform jitter in `-spread..=spread`.
fn jitter(spread: f32) -> f32 {
    let unit = OsRng.next_u32() as f32 / u32::MAX as f32;
    (unit * 2.0 - 1.0) * spread
}

impl SensorSource for SimulatedSensors {
    fn sample(&mut self) -> SensorSample {
        if self.pump.load(Ordering::Relaxed) {
            self.soil_moisture += WETTING_PER_SAMPLE;
            self.water_level = (self.water_level - 1).max(0);
        } else {
            self.soil_moisture -= DRYING_PER_SAMPLE;
        }
        self.soil_moisture = self.soil_moisture.clamp(0.0, 100.0);

        let light = 2000.0 + jitter(300.0);
        SensorSample {
            temperature: Some(24.0 + jitter(1.5)),
            air_humidity: Some(60.0 + jitter(5.0)),
            soil_moisture_pct: self.soil_moisture,
            light_raw: (light as i32).clamp(0, i32::from(ADC_MAX)),
            water_level_pct: self.water_level,
        }
    }
}

/// Output driver that also reports the pump to a [`SimulatedSensors`].
pub struct SimulatedActuators<A: Actuators> {
    inner: A,
    pump: Arc<AtomicBool>,
}

impl<A: Actuators> SimulatedActuators<A> {
    /// Wrapped driver.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Actuators> Actuators for SimulatedActuators<A> {
    fn apply(&mut self, outputs: &OutputState) {
        self.pump.store(outputs.pump, Ordering::Relaxed);
        self.inner.apply(outputs);
    }
}
