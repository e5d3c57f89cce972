//! Publish/subscribe session lifecycle.
//!
//! [`MessagingSession`] owns one broker connection through an
//! [`MqttTransport`]. It only moves to [`MessagingState::Connected`] once the
//! handshake, the command subscriptions and the state republish have all
//! completed.

use super::topics::{self, Outbound, COMMAND_TOPICS};
use crate::device::{on_off, DeviceContext};
use crate::network::ConnectionMode;
use log::{debug, info, warn};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Granularity of the cancellable reconnect wait.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on messages drained per pump so one busy topic cannot starve
/// the polling cycle.
pub const MAX_MESSAGES_PER_PUMP: usize = 16;

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic it was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create a message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Broker client used by the session.
pub trait MqttTransport {
    /// Open a connection and complete the broker handshake.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Whether the underlying connection is still up.
    fn is_connected(&self) -> bool;

    /// Subscribe to an exact topic.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Publish without waiting for delivery.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Service keep-alive and return the next received message, if any.
    ///
    /// Must not block.
    fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError>;

    /// Write out queued publishes, then disconnect.
    fn close(&mut self);
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingState {
    /// No usable broker connection.
    Disconnected,
    /// Handshake, subscriptions and republish completed.
    Connected,
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection or handshake failed.
    Connect(String),
    /// Handshake did not finish in time.
    Timeout,
    /// Subscription request failed.
    Subscribe(String),
    /// Publish request failed.
    Publish(String),
    /// Connection dropped.
    Closed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect failed: {}", e),
            Self::Timeout => write!(f, "handshake timed out"),
            Self::Subscribe(e) => write!(f, "subscribe failed: {}", e),
            Self::Publish(e) => write!(f, "publish failed: {}", e),
            Self::Closed(e) => write!(f, "connection closed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The device is not joined to a station network.
    NotStation(ConnectionMode),
    /// The reconnect loop was cancelled.
    Cancelled,
    /// Operation needs a live connection.
    NotConnected,
    /// Transport failure.
    Transport(TransportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStation(mode) => write!(f, "not in station mode ({:?})", mode),
            Self::Cancelled => write!(f, "reconnect cancelled"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Broker session with reconnect and state republish.
pub struct MessagingSession<T: MqttTransport> {
    transport: T,
    state: MessagingState,
    reconnect_delay: Duration,
    connects: u64,
}

impl<T: MqttTransport> MessagingSession<T> {
    /// Create a disconnected session.
    pub fn new(transport: T, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            state: MessagingState::Disconnected,
            reconnect_delay,
            connects: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> MessagingState {
        self.state
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.state == MessagingState::Connected
    }

    /// Number of completed handshakes since creation.
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Connect if needed, retrying with a fixed delay until it succeeds or
    /// `cancel` fires.
    ///
    /// Returns `Ok(false)` when already connected and `Ok(true)` after a new
    /// handshake. After a new handshake every command topic is subscribed
    /// and the four status values are published once.
    pub fn ensure_connected(
        &mut self,
        ctx: &DeviceContext,
        cancel: &CancellationToken,
    ) -> Result<bool, SessionError> {
        if ctx.mode != ConnectionMode::StationConnected {
            return Err(SessionError::NotStation(ctx.mode));
        }
        if self.is_connected() {
            if self.transport.is_connected() {
                return Ok(false);
            }
            warn!("Broker connection lost");
            self.state = MessagingState::Disconnected;
        }

        let mut attempt: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            attempt += 1;

            match self.handshake() {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "Broker connection attempt {} failed: {}, retrying in {:?}",
                        attempt, e, self.reconnect_delay
                    );
                    if !wait_cancellable(self.reconnect_delay, cancel) {
                        return Err(SessionError::Cancelled);
                    }
                }
            }
        }

        self.state = MessagingState::Connected;
        self.connects += 1;
        info!("Broker session established (attempt {})", attempt);
        self.republish_state(ctx);
        Ok(true)
    }

    fn handshake(&mut self) -> Result<(), TransportError> {
        self.transport.connect()?;
        for topic in COMMAND_TOPICS {
            self.transport.subscribe(topic)?;
            debug!("Subscribed to {}", topic);
        }
        Ok(())
    }

    fn republish_state(&mut self, ctx: &DeviceContext) {
        let snapshot = [
            Outbound::status(ctx.connection_status.clone()),
            Outbound::new(topics::PUMP_STATUS, on_off(ctx.pump_on())),
            Outbound::new(topics::ALERT_STATUS, on_off(ctx.alert_on)),
            Outbound::new(
                topics::AUTO_IRRIGATION_STATUS,
                on_off(ctx.irrigation.enabled()),
            ),
        ];
        for msg in &snapshot {
            self.publish_outbound(msg);
        }
    }

    /// Drain received messages and service keep-alive.
    ///
    /// A transport failure drops the session to
    /// [`MessagingState::Disconnected`]; the next
    /// [`MessagingSession::ensure_connected`] reconnects.
    pub fn pump(&mut self) -> Vec<InboundMessage> {
        let mut received = Vec::new();
        if !self.is_connected() {
            return received;
        }

        while received.len() < MAX_MESSAGES_PER_PUMP {
            match self.transport.poll() {
                Ok(Some(msg)) => {
                    debug!("Received {} bytes on {}", msg.payload.len(), msg.topic);
                    received.push(msg);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Broker connection lost: {}", e);
                    self.state = MessagingState::Disconnected;
                    break;
                }
            }
        }

        if self.is_connected() && !self.transport.is_connected() {
            warn!("Broker connection lost");
            self.state = MessagingState::Disconnected;
        }
        received
    }

    /// Best-effort publish. Returns whether the message was handed to the
    /// transport; failures are logged and dropped.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        if !self.is_connected() {
            debug!("Not connected, dropping message for {}", topic);
            return false;
        }
        match self.transport.publish(topic, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping message for {}: {}", topic, e);
                false
            }
        }
    }

    /// Publish a prepared message.
    pub fn publish_outbound(&mut self, msg: &Outbound) -> bool {
        self.publish(msg.topic, msg.payload.as_bytes())
    }

    /// Flush pending publishes and end the broker connection.
    ///
    /// Used before a restart so the last status message is not lost.
    pub fn close(&mut self) {
        if self.is_connected() {
            debug!("Closing broker session");
        }
        self.transport.close();
        self.state = MessagingState::Disconnected;
    }

    /// Subscribe to an additional topic on the live connection.
    pub fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.transport.subscribe(topic)?;
        Ok(())
    }
}

/// Sleep for `delay`, waking early if `cancel` fires.
///
/// Returns false if cancelled.
pub fn wait_cancellable(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(CANCEL_CHECK_INTERVAL));
    }
}
