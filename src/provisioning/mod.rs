//! Provisioning portal.
//!
//! While the device hosts its access point, a small HTTP endpoint serves a
//! credential form and accepts submissions. The control loop services it
//! without blocking through [`ProvisioningEndpoint::service`].
//!
//! # Components
//!
//! - [`form`] - Request routing and form decoding
//! - [`server`] - `tiny_http` server

pub mod form;
pub mod server;

pub use form::{handle_request, parse_submission, PortalReply};
pub use server::PortalServer;

use crate::config::{IdentityError, NetworkIdentity};
use std::fmt;
use std::net::IpAddr;

/// Configuration endpoint hosted in provisioning mode.
pub trait ProvisioningEndpoint {
    /// Start listening on `address:port`.
    fn start(&mut self, address: IpAddr, port: u16) -> Result<(), PortalError>;

    /// Whether the endpoint is listening.
    fn is_running(&self) -> bool;

    /// Handle pending requests without blocking.
    ///
    /// Returns the identity from an accepted submission, if any. The
    /// submitting client gets no reply until [`acknowledge`] is called.
    ///
    /// [`acknowledge`]: ProvisioningEndpoint::acknowledge
    fn service(&mut self) -> Option<NetworkIdentity>;

    /// Answer the client whose submission [`service`] returned, once the
    /// caller knows whether the identity was stored.
    ///
    /// [`service`]: ProvisioningEndpoint::service
    fn acknowledge(&mut self, stored: bool);
}

/// Portal errors.
#[derive(Debug)]
pub enum PortalError {
    /// Could not bind the listening socket.
    Bind(String),
    /// Submission is not a valid form.
    BadForm(&'static str),
    /// Submitted identity failed validation.
    Identity(IdentityError),
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "failed to bind portal: {}", e),
            Self::BadForm(e) => write!(f, "invalid submission: {}", e),
            Self::Identity(e) => write!(f, "invalid identity: {}", e),
        }
    }
}

impl std::error::Error for PortalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Identity(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IdentityError> for PortalError {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}
