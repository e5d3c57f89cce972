//! Broker messaging: topics, command dispatch and the session lifecycle.
//!
//! # Components
//!
//! - [`topics`] - Fixed topic names and the outbound message type
//! - [`command`] - Inbound command parsing and pure dispatch
//! - [`session`] - Connection lifecycle over an [`MqttTransport`]
//! - `link` - Event channel from a client thread to its transport
//! - `host` / `esp` - Platform transports

pub mod command;
mod link;
pub mod session;
pub mod topics;

#[cfg(feature = "esp32")]
mod esp;
#[cfg(not(feature = "esp32"))]
mod host;

pub use command::{dispatch, Command, Effect, Switch};
#[cfg(feature = "esp32")]
pub use esp::EspMqttTransport;
#[cfg(not(feature = "esp32"))]
pub use host::RumqttTransport;
pub use session::{
    InboundMessage, MessagingSession, MessagingState, MqttTransport, SessionError,
    TransportError,
};
pub use topics::Outbound;
