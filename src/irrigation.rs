//! Hysteresis irrigation controller.
//!
//! Drives the pump from a soil moisture percentage using two thresholds so
//! the actuator does not chatter around a single setpoint:
//!
//! ```text
//!   actuator off ──(moisture < low)──▶ actuator on
//!   actuator on  ──(moisture ≥ high)─▶ actuator off
//!   anything else holds
//! ```
//!
//! A missing or non-finite reading never starts the pump and stops a pump
//! that is already running; a dead sensor must not flood the bed.
//!
//! Automatic mode is gated by an operator flag; while it is off the actuator
//! is always off.
//!
//! # Example
//!
//! ```
//! use greenhouse_controller::irrigation::IrrigationController;
//!
//! let mut controller = IrrigationController::default();
//! assert!(controller.update(true, 35.0));  // dry: start
//! assert!(controller.update(true, 55.0));  // dead band: hold
//! assert!(!controller.update(true, 70.0)); // wet: stop
//! ```

use crate::config::Thresholds;
use log::{info, warn};

/// Irrigation state: operator flag plus computed actuator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrrigationState {
    /// Automatic irrigation enabled by the operator.
    pub enabled: bool,
    /// Actuator output. Never true while `enabled` is false.
    pub actuator_on: bool,
}

/// Two-threshold irrigation controller.
#[derive(Debug, Clone)]
pub struct IrrigationController {
    state: IrrigationState,
    thresholds: Thresholds,
}

impl IrrigationController {
    /// Create a controller with automatic mode disabled.
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            state: IrrigationState::default(),
            thresholds,
        }
    }

    /// Current state.
    pub fn state(&self) -> IrrigationState {
        self.state
    }

    /// Automatic mode flag.
    pub fn enabled(&self) -> bool {
        self.state.enabled
    }

    /// Actuator output.
    pub fn actuator_on(&self) -> bool {
        self.state.actuator_on
    }

    /// Thresholds in use.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Set the operator flag. Disabling forces the actuator off.
    ///
    /// Returns true if the actuator changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        self.state.enabled = enabled;
        if !enabled && self.state.actuator_on {
            self.state.actuator_on = false;
            info!("Automatic irrigation disabled, pump forced off");
            return true;
        }
        false
    }

    /// Force the actuator off without touching the operator flag.
    ///
    /// The next [`IrrigationController::update`] re-evaluates from the off
    /// state. Returns true if the actuator changed.
    pub fn reset_actuator(&mut self) -> bool {
        let was_on = self.state.actuator_on;
        self.state.actuator_on = false;
        was_on
    }

    /// Run one decision with the given flag and moisture reading.
    ///
    /// A non-finite reading turns the actuator off.
    /// Returns whether the actuator should be on.
    pub fn update(&mut self, enabled: bool, soil_moisture_pct: f32) -> bool {
        if !enabled {
            self.set_enabled(false);
            return false;
        }
        self.state.enabled = true;

        if !soil_moisture_pct.is_finite() {
            if self.state.actuator_on {
                warn!("Soil moisture reading unavailable, pump off");
                self.state.actuator_on = false;
            }
            return false;
        }

        if !self.state.actuator_on && soil_moisture_pct < self.thresholds.low {
            info!(
                "Soil moisture {:.0}% below {:.0}%, pump on",
                soil_moisture_pct, self.thresholds.low
            );
            self.state.actuator_on = true;
        } else if self.state.actuator_on && soil_moisture_pct >= self.thresholds.high {
            info!(
                "Soil moisture {:.0}% reached {:.0}%, pump off",
                soil_moisture_pct, self.thresholds.high
            );
            self.state.actuator_on = false;
        }

        self.state.actuator_on
    }
}

impl Default for IrrigationController {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(controller: &mut IrrigationController, readings: &[f32]) -> Vec<bool> {
        readings
            .iter()
            .map(|&m| controller.update(true, m))
            .collect()
    }

    // ==================== Hysteresis Tests ====================

    #[test]
    fn test_documented_sequence() {
        let mut controller = IrrigationController::default();
        assert_eq!(
            run(&mut controller, &[35.0, 35.0, 71.0, 39.0]),
            vec![true, true, false, true]
        );
    }

    #[test]
    fn test_dead_band_holds_off() {
        let mut controller = IrrigationController::default();
        assert_eq!(
            run(&mut controller, &[40.0, 55.0, 69.9, 40.0]),
            vec![false, false, false, false]
        );
    }

    #[test]
    fn test_dead_band_holds_on() {
        let mut controller = IrrigationController::default();
        assert_eq!(
            run(&mut controller, &[10.0, 40.0, 55.0, 69.9, 39.0, 70.0]),
            vec![true, true, true, true, true, false]
        );
    }

    #[test]
    fn test_threshold_edges() {
        let mut controller = IrrigationController::default();
        assert!(!controller.update(true, 40.0)); // not strictly below
        assert!(controller.update(true, 39.99));
        assert!(controller.update(true, 69.99));
        assert!(!controller.update(true, 70.0)); // at high threshold
    }

    #[test]
    fn test_no_chatter_over_sweep() {
        // Sweep up and down through the band; count transitions.
        let mut controller = IrrigationController::default();
        let mut readings: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        readings.extend((0..=100).rev().map(|v| v as f32));

        let outputs = run(&mut controller, &readings);
        let transitions = outputs.windows(2).filter(|w| w[0] != w[1]).count();
        // on at 0, off at 70, on again at 39 on the way down
        assert_eq!(transitions, 2);
        assert!(outputs[0]);
    }

    #[test]
    fn test_invariant_over_random_walk() {
        let mut controller = IrrigationController::default();
        let mut moisture = 50.0f32;
        let mut prev = controller.actuator_on();
        // deterministic pseudo-random walk
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..2000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let step = ((seed >> 16) % 11) as f32 - 5.0;
            moisture = (moisture + step).clamp(0.0, 100.0);
            let on = controller.update(true, moisture);
            if on != prev {
                if on {
                    assert!(moisture < 40.0, "turned on at {}", moisture);
                } else {
                    assert!(moisture >= 70.0, "turned off at {}", moisture);
                }
            }
            prev = on;
        }
    }

    #[test]
    fn test_non_finite_reading_stops_running_pump() {
        let mut controller = IrrigationController::default();
        assert!(controller.update(true, 20.0));
        assert!(!controller.update(true, f32::NAN));
        assert!(!controller.state().actuator_on);
        // a valid dry reading starts it again
        assert!(controller.update(true, 20.0));
        assert!(!controller.update(true, f32::INFINITY));
    }

    #[test]
    fn test_non_finite_reading_never_starts_pump() {
        let mut controller = IrrigationController::default();
        assert!(!controller.update(true, f32::NAN));
        assert!(!controller.update(true, f32::NEG_INFINITY));
        assert!(controller.state().enabled);
    }

    #[test]
    fn test_custom_thresholds() {
        let mut controller = IrrigationController::new(Thresholds::new(20.0, 30.0).unwrap());
        assert_eq!(
            run(&mut controller, &[25.0, 19.0, 29.0, 30.0]),
            vec![false, true, true, false]
        );
    }

    // ==================== Enable / Disable Tests ====================

    #[test]
    fn test_disabled_never_turns_on() {
        let mut controller = IrrigationController::default();
        for m in [0.0, 10.0, 39.0] {
            assert!(!controller.update(false, m));
            assert!(!controller.actuator_on());
        }
    }

    #[test]
    fn test_disable_forces_off_in_same_call() {
        let mut controller = IrrigationController::default();
        assert!(controller.update(true, 10.0));
        assert!(!controller.update(false, 10.0));
        assert_eq!(
            controller.state(),
            IrrigationState {
                enabled: false,
                actuator_on: false
            }
        );
    }

    #[test]
    fn test_set_enabled_false_forces_off() {
        let mut controller = IrrigationController::default();
        controller.update(true, 10.0);
        assert!(controller.set_enabled(false));
        assert!(!controller.actuator_on());
        assert!(!controller.set_enabled(false));
    }

    #[test]
    fn test_reset_actuator() {
        let mut controller = IrrigationController::default();
        controller.update(true, 10.0);
        assert!(controller.reset_actuator());
        assert!(controller.enabled());
        assert!(!controller.actuator_on());
        // still dry, so the next decision turns it back on
        assert!(controller.update(true, 10.0));
    }
}
