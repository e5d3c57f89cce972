//! Inbound command parsing and dispatch.
//!
//! Dispatch is a pure decision step: it mutates the [`DeviceContext`] and
//! returns the [`Effect`]s the caller has to carry out (publishing,
//! persisting a new identity, scanning). Nothing here touches the transport.

use super::topics::{self, Outbound};
use crate::config::NetworkIdentity;
use crate::device::{on_off, DeviceContext};
use log::{debug, info, warn};
use std::fmt;

/// Literal payload of the on/off control topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    /// `"ON"`
    On,
    /// `"OFF"`
    Off,
}

impl Switch {
    /// Parse an exact `"ON"` / `"OFF"` payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            b"ON" => Some(Self::On),
            b"OFF" => Some(Self::Off),
            _ => None,
        }
    }

    /// Wire literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    /// As a flag.
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload that triggers a scan.
pub const SCAN_TRIGGER: &[u8] = b"1";

/// A recognised inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Persist a new network identity and restart.
    UpdateIdentity(NetworkIdentity),
    /// Scan for networks and publish the names.
    Scan,
    /// Manual pump control.
    Pump(Switch),
    /// Alert indicator control.
    Alert(Switch),
    /// Automatic irrigation enable/disable.
    AutoIrrigation(Switch),
}

impl Command {
    /// Decode a message by exact topic match.
    ///
    /// Returns `None` for unknown topics and for payloads the handler does
    /// not accept. Malformed identity payloads are logged.
    pub fn parse(topic: &str, payload: &[u8]) -> Option<Self> {
        match topic {
            topics::IDENTITY_UPDATE => match NetworkIdentity::from_json(payload) {
                Ok(identity) => Some(Self::UpdateIdentity(identity)),
                Err(e) => {
                    warn!("Dropping identity update: {}", e);
                    None
                }
            },
            topics::SCAN_COMMAND => (payload == SCAN_TRIGGER).then_some(Self::Scan),
            topics::PUMP_CONTROL => Switch::parse(payload).map(Self::Pump),
            topics::ALERT_CONTROL => Switch::parse(payload).map(Self::Alert),
            topics::AUTO_IRRIGATION_CONTROL => Switch::parse(payload).map(Self::AutoIrrigation),
            _ => None,
        }
    }
}

/// Work the caller must perform after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish a message (best effort).
    Publish(Outbound),
    /// Persist the identity and restart.
    ApplyIdentity(NetworkIdentity),
    /// Run a network scan and publish the results.
    Scan,
}

/// Decide what an inbound message does.
///
/// Unknown topics and unaccepted payloads produce no effects and leave the
/// context untouched.
pub fn dispatch(topic: &str, payload: &[u8], ctx: &mut DeviceContext) -> Vec<Effect> {
    let Some(command) = Command::parse(topic, payload) else {
        debug!("Ignoring message on '{}' ({} bytes)", topic, payload.len());
        return Vec::new();
    };
    execute(command, ctx)
}

/// Apply a parsed command to the context.
pub fn execute(command: Command, ctx: &mut DeviceContext) -> Vec<Effect> {
    match command {
        Command::UpdateIdentity(identity) => {
            info!("Identity update received for '{}'", identity.name());
            vec![Effect::ApplyIdentity(identity)]
        }
        Command::Scan => {
            info!("Scan requested");
            vec![Effect::Scan]
        }
        Command::Pump(switch) => {
            info!("Pump command: {}", switch);
            ctx.manual_pump = switch.is_on();
            if !switch.is_on() {
                ctx.irrigation.reset_actuator();
            }
            vec![pump_status(ctx)]
        }
        Command::Alert(switch) => {
            info!("Alert command: {}", switch);
            ctx.alert_on = switch.is_on();
            vec![Effect::Publish(Outbound::new(
                topics::ALERT_STATUS,
                switch.as_str(),
            ))]
        }
        Command::AutoIrrigation(switch) => {
            info!("Automatic irrigation: {}", switch);
            let pump_before = ctx.pump_on();
            ctx.irrigation.set_enabled(switch.is_on());

            let mut effects = vec![Effect::Publish(Outbound::new(
                topics::AUTO_IRRIGATION_STATUS,
                switch.as_str(),
            ))];
            if ctx.pump_on() != pump_before {
                effects.push(pump_status(ctx));
            }
            effects
        }
    }
}

/// Current pump status message.
pub fn pump_status(ctx: &DeviceContext) -> Effect {
    Effect::Publish(Outbound::new(topics::PUMP_STATUS, on_off(ctx.pump_on())))
}
