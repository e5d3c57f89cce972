//! Top-level control loop.
//!
//! [`Controller`] owns every component and runs the single-threaded
//! scheduler. Each tick services exactly one mode:
//!
//! - `ProvisioningAP`: the provisioning portal
//! - `StationConnected`: the broker session, inbound commands and, when the
//!   [`PollTimer`] fires, one sensor poll cycle
//!
//! Outputs are re-asserted at the end of every tick.

use crate::config::DeviceConfig;
use crate::device::{on_off, Actuators, DeviceContext};
use crate::display::{DisplaySink, DisplayStatus};
use crate::messaging::topics::{self, Outbound};
use crate::messaging::{dispatch, Effect, MessagingSession, MqttTransport, SessionError};
use crate::network::{ConnectionMode, NetworkError, NetworkManager};
use crate::provisioning::ProvisioningEndpoint;
use crate::sensors::SensorSource;
use crate::storage::ByteStore;
use crate::wifi::WifiDriver;
use log::{debug, error, info, warn};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Sleep between ticks in [`Controller::run`].
pub const IDLE_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep ticking.
    Continue,
    /// A new identity was stored; re-run initialization from scratch.
    Restart,
    /// Shutdown requested.
    Cancelled,
}

/// Fixed-period gate driven by a monotonic clock.
///
/// Fires on the first check, then whenever a full period has elapsed since
/// it last fired.
#[derive(Debug, Clone)]
pub struct PollTimer {
    period: Duration,
    last: Option<Instant>,
}

impl PollTimer {
    /// Create a timer that fires immediately.
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Whether a poll is due at `now`. Firing restarts the period.
    pub fn due(&mut self, now: Instant) -> bool {
        let fire = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        };
        if fire {
            self.last = Some(now);
        }
        fire
    }

    /// Make the next check fire.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// The firmware: network, messaging, irrigation and I/O in one loop.
pub struct Controller<W, B, P, T, S, A, D>
where
    W: WifiDriver,
    B: ByteStore,
    P: ProvisioningEndpoint,
    T: MqttTransport,
    S: SensorSource,
    A: Actuators,
    D: DisplaySink,
{
    ctx: DeviceContext,
    network: NetworkManager<W, B, P>,
    session: MessagingSession<T>,
    sensors: S,
    actuators: A,
    display: D,
    poll_timer: PollTimer,
    cancel: CancellationToken,
}

impl<W, B, P, T, S, A, D> Controller<W, B, P, T, S, A, D>
where
    W: WifiDriver,
    B: ByteStore,
    P: ProvisioningEndpoint,
    T: MqttTransport,
    S: SensorSource,
    A: Actuators,
    D: DisplaySink,
{
    /// Assemble a controller. The session's reconnect delay and the poll
    /// period come from `config`.
    pub fn new(
        config: &DeviceConfig,
        network: NetworkManager<W, B, P>,
        transport: T,
        sensors: S,
        actuators: A,
        display: D,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx: DeviceContext::new(config.thresholds),
            network,
            session: MessagingSession::new(transport, config.reconnect_delay),
            sensors,
            actuators,
            display,
            poll_timer: PollTimer::new(config.poll_period),
            cancel,
        }
    }

    /// Device state.
    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    /// Network manager.
    pub fn network(&self) -> &NetworkManager<W, B, P> {
        &self.network
    }

    /// Broker session.
    pub fn session(&self) -> &MessagingSession<T> {
        &self.session
    }

    /// Broker session, mutably.
    pub fn session_mut(&mut self) -> &mut MessagingSession<T> {
        &mut self.session
    }

    /// Sensor source.
    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    /// Output driver.
    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    /// Display sink.
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Dismantle, returning the network manager (and with it the
    /// credential store) for a rebuild.
    pub fn into_network(self) -> NetworkManager<W, B, P> {
        self.network
    }

    /// Run network initialization.
    ///
    /// Errors are fatal: the access point or portal could not start.
    pub fn boot(&mut self) -> Result<(), NetworkError> {
        info!("Booting greenhouse controller");
        let statuses = self.network.initialize(&mut self.ctx)?;
        self.publish_all(&statuses);
        self.poll_timer.reset();
        self.apply_outputs();
        info!("Boot complete: {:?}", self.ctx.mode);
        Ok(())
    }

    /// Run one scheduler tick.
    pub fn tick(&mut self, now: Instant) -> Tick {
        if self.cancel.is_cancelled() {
            return Tick::Cancelled;
        }

        let outcome = match self.ctx.mode {
            ConnectionMode::ProvisioningAP => self.tick_provisioning(),
            ConnectionMode::StationConnected => self.tick_station(now),
            ConnectionMode::Disconnected | ConnectionMode::StationConnecting => Tick::Continue,
        };

        self.apply_outputs();
        outcome
    }

    /// Tick until a restart or cancellation.
    pub fn run(&mut self) -> Tick {
        loop {
            match self.tick(Instant::now()) {
                Tick::Continue => thread::sleep(IDLE_INTERVAL),
                other => return other,
            }
        }
    }

    fn tick_provisioning(&mut self) -> Tick {
        match self.network.service_portal(&mut self.ctx) {
            Ok(true) => Tick::Restart,
            Ok(false) => Tick::Continue,
            Err(e) => {
                error!("Failed to store submitted identity: {}", e);
                Tick::Continue
            }
        }
    }

    fn tick_station(&mut self, now: Instant) -> Tick {
        match self.session.ensure_connected(&self.ctx, &self.cancel) {
            Ok(_) => {}
            Err(SessionError::Cancelled) => return Tick::Cancelled,
            Err(e) => {
                warn!("Messaging unavailable: {}", e);
                return Tick::Continue;
            }
        }

        for msg in self.session.pump() {
            let effects = dispatch(&msg.topic, &msg.payload, &mut self.ctx);
            if self.run_effects(effects) == Tick::Restart {
                return Tick::Restart;
            }
        }

        if self.poll_timer.due(now) {
            self.poll_cycle();
        }
        Tick::Continue
    }

    fn run_effects(&mut self, effects: Vec<Effect>) -> Tick {
        for effect in effects {
            match effect {
                Effect::Publish(msg) => {
                    self.session.publish_outbound(&msg);
                }
                Effect::Scan => {
                    let results = self.network.scan();
                    self.session.publish_outbound(&results);
                }
                Effect::ApplyIdentity(identity) => {
                    match self.network.apply_new_identity(&identity, &mut self.ctx) {
                        Ok(statuses) => {
                            self.publish_all(&statuses);
                            self.session.close();
                            return Tick::Restart;
                        }
                        Err(e) => error!("Failed to store identity update: {}", e),
                    }
                }
            }
        }
        Tick::Continue
    }

    /// Sample, decide irrigation, publish telemetry, render.
    fn poll_cycle(&mut self) {
        let sample = self.sensors.sample();

        let actuator_before = self.ctx.irrigation.actuator_on();
        let pump_before = self.ctx.pump_on();
        let enabled = self.ctx.irrigation.enabled();
        let moisture = sample.valid_soil_moisture().unwrap_or(f32::NAN);
        self.ctx.irrigation.update(enabled, moisture);

        if self.ctx.irrigation.actuator_on() != actuator_before
            || self.ctx.pump_on() != pump_before
        {
            self.apply_outputs();
            let status = Outbound::new(topics::PUMP_STATUS, on_off(self.ctx.pump_on()));
            self.session.publish_outbound(&status);
        }

        let telemetry = sample.telemetry();
        debug!("Publishing {} telemetry values", telemetry.len());
        self.publish_all(&telemetry);

        let status = DisplayStatus {
            mode: self.ctx.mode,
            messaging_connected: self.session.is_connected(),
            pump_on: self.ctx.pump_on(),
            auto_irrigation: self.ctx.irrigation.enabled(),
        };
        self.display.render(&sample, &status);
    }

    fn publish_all(&mut self, messages: &[Outbound]) {
        for msg in messages {
            self.session.publish_outbound(msg);
        }
    }

    fn apply_outputs(&mut self) {
        self.actuators.apply(&self.ctx.outputs());
    }
}
