//! Greenhouse controller firmware library.
//!
//! This library contains platform-independent components that can be tested
//! on the host machine without ESP32 hardware. Platform drivers (WiFi radio,
//! MQTT client, ADC sensors, GPIO outputs, NVS) sit behind traits and are
//! selected by the `esp32` feature.

pub mod config;
pub mod controller;
pub mod device;
pub mod display;
pub mod irrigation;
pub mod messaging;
pub mod network;
pub mod provisioning;
pub mod sensors;
pub mod storage;
#[cfg(test)]
pub(crate) mod testing;
pub mod wifi;

// Re-export commonly used items
pub use config::{DeviceConfig, NetworkIdentity, Thresholds};
pub use controller::{Controller, PollTimer, Tick};
pub use device::{Actuators, DeviceContext, LogActuators, OutputState};
pub use display::{DisplaySink, LogDisplay};
pub use irrigation::IrrigationController;
pub use messaging::{MessagingSession, MqttTransport, Outbound};
pub use network::{ConnectionMode, NetworkError, NetworkManager};
pub use provisioning::{PortalServer, ProvisioningEndpoint};
pub use sensors::{SensorSample, SensorSource};
pub use storage::{ByteStore, CredentialStore, MemoryStore};
pub use wifi::{ScanEntry, WifiDriver};
