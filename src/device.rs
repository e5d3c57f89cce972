//! Owned device state and physical outputs.
//!
//! [`DeviceContext`] is the single mutable state record passed to the
//! network manager, dispatch and polling loop. [`Actuators`] drives the
//! physical outputs from a projection of that state.

use crate::config::Thresholds;
use crate::irrigation::IrrigationController;
use crate::network::ConnectionMode;
use log::info;

/// Snapshot of every binary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputState {
    /// Pump relay.
    pub pump: bool,
    /// Alert indicator.
    pub alert: bool,
    /// Station-connected indicator.
    pub connected_indicator: bool,
    /// Provisioning/disconnected indicator.
    pub provisioning_indicator: bool,
}

/// Physical output driver.
///
/// `apply` is called every scheduler tick with the full state, so
/// implementations must be idempotent.
pub trait Actuators {
    /// Drive every output to the given state.
    fn apply(&mut self, outputs: &OutputState);
}

/// Actuators that only log changes (host builds).
#[derive(Debug, Default)]
pub struct LogActuators {
    last: Option<OutputState>,
}

impl LogActuators {
    /// Create a new logging driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied state.
    pub fn last(&self) -> Option<OutputState> {
        self.last
    }
}

impl Actuators for LogActuators {
    fn apply(&mut self, outputs: &OutputState) {
        if self.last.as_ref() != Some(outputs) {
            info!(
                "Outputs: pump={} alert={} connected={} provisioning={}",
                on_off(outputs.pump),
                on_off(outputs.alert),
                on_off(outputs.connected_indicator),
                on_off(outputs.provisioning_indicator)
            );
            self.last = Some(*outputs);
        }
    }
}

/// Render a flag as the wire literal.
pub fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// Mutable device state shared by every component on the control thread.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    /// Network identity state.
    pub mode: ConnectionMode,
    /// Automatic irrigation.
    pub irrigation: IrrigationController,
    /// Pump requested by an operator command.
    pub manual_pump: bool,
    /// Alert indicator requested by an operator command.
    pub alert_on: bool,
    /// Last connection status text, republished on every broker reconnect.
    pub connection_status: String,
}

impl DeviceContext {
    /// Fresh state at boot.
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            mode: ConnectionMode::Disconnected,
            irrigation: IrrigationController::new(thresholds),
            manual_pump: false,
            alert_on: false,
            connection_status: String::new(),
        }
    }

    /// Physical pump output: operator request or automatic irrigation.
    pub fn pump_on(&self) -> bool {
        self.manual_pump || self.irrigation.actuator_on()
    }

    /// Project the state onto the physical outputs.
    pub fn outputs(&self) -> OutputState {
        let indicators = self.mode.indicators();
        OutputState {
            pump: self.pump_on(),
            alert: self.alert_on,
            connected_indicator: indicators.connected,
            provisioning_indicator: indicators.provisioning,
        }
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

#[cfg(feature = "esp32")]
pub use esp::GpioActuators;

#[cfg(feature = "esp32")]
mod esp {
    use super::{Actuators, OutputState};
    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
    use esp_idf_sys::EspError;
    use log::warn;

    /// GPIO-driven outputs. All outputs are active high.
    pub struct GpioActuators {
        pump: PinDriver<'static, AnyOutputPin, Output>,
        alert: PinDriver<'static, AnyOutputPin, Output>,
        connected: PinDriver<'static, AnyOutputPin, Output>,
        provisioning: PinDriver<'static, AnyOutputPin, Output>,
    }

    impl GpioActuators {
        /// Take ownership of the four output pins.
        pub fn new(
            pump: AnyOutputPin,
            alert: AnyOutputPin,
            connected: AnyOutputPin,
            provisioning: AnyOutputPin,
        ) -> Result<Self, EspError> {
            Ok(Self {
                pump: PinDriver::output(pump)?,
                alert: PinDriver::output(alert)?,
                connected: PinDriver::output(connected)?,
                provisioning: PinDriver::output(provisioning)?,
            })
        }
    }

    impl Actuators for GpioActuators {
        fn apply(&mut self, outputs: &OutputState) {
            let results = [
                self.pump.set_level(outputs.pump.into()),
                self.alert.set_level(outputs.alert.into()),
                self.connected.set_level(outputs.connected_indicator.into()),
                self.provisioning
                    .set_level(outputs.provisioning_indicator.into()),
            ];
            for result in results {
                if let Err(e) = result {
                    warn!("GPIO write failed: {:?}", e);
                }
            }
        }
    }
}
