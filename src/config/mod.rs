//! Device configuration management.
//!
//! # Components
//!
//! - [`identity`] - station-mode network identity (host-testable)
//! - [`device`] - broker endpoint, cadence, thresholds and access point tunables

mod device;
mod identity;

pub use device::{
    AccessPointConfig, BrokerConfig, DeviceConfig, DeviceConfigError, JoinPolicy, Thresholds,
    AP_ADDRESS, AP_NAME, AP_SECRET, HIGH_THRESHOLD, JOIN_ATTEMPTS, JOIN_POLL_INTERVAL,
    LOW_THRESHOLD, POLL_PERIOD, RECONNECT_DELAY,
};
pub use identity::{IdentityError, NetworkIdentity, MAX_NAME_LEN, MAX_SECRET_LEN};
