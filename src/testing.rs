//! Test doubles shared by the unit tests.
//!
//! Every fake records what it was asked to do and exposes its counters as
//! public fields so tests can assert on them directly.

use crate::config::{AccessPointConfig, NetworkIdentity};
use crate::device::{Actuators, OutputState};
use crate::messaging::{InboundMessage, MqttTransport, TransportError};
use crate::provisioning::{PortalError, ProvisioningEndpoint};
use crate::sensors::{SensorSample, SensorSource};
use crate::storage::{ByteStore, MemoryStore, StorageError};
use crate::wifi::{ScanEntry, WifiDriver, WifiError};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use tokio_util::sync::CancellationToken;

// ==================== WiFi ====================

/// Scripted radio.
#[derive(Debug, Default)]
pub struct FakeWifi {
    /// Link comes up on this poll (1-based); `None` never.
    pub connect_after: Option<u32>,
    /// `begin_station` fails.
    pub reject_station: bool,
    /// `start_access_point` fails.
    pub fail_access_point: bool,
    /// `scan` fails.
    pub fail_scan: bool,
    /// Networks returned by `scan`.
    pub networks: Vec<ScanEntry>,
    /// Calls to `begin_station`.
    pub station_begins: u32,
    /// Calls to `is_connected`.
    pub polls: u32,
    /// Calls to `stop_station`.
    pub station_stops: u32,
    /// Calls to `start_access_point`.
    pub ap_starts: u32,
    joining: bool,
}

impl FakeWifi {
    /// A radio whose station never comes up.
    pub fn new() -> Self {
        Self::default()
    }

    /// A radio whose station is up on the first poll.
    pub fn connected() -> Self {
        Self {
            connect_after: Some(1),
            ..Self::default()
        }
    }
}

impl WifiDriver for FakeWifi {
    fn begin_station(&mut self, _identity: &NetworkIdentity) -> Result<(), WifiError> {
        self.station_begins += 1;
        if self.reject_station {
            return Err(WifiError::InvalidName);
        }
        self.joining = true;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.polls += 1;
        self.joining && self.connect_after.is_some_and(|n| self.polls >= n)
    }

    fn station_address(&self) -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))
    }

    fn stop_station(&mut self) -> Result<(), WifiError> {
        self.station_stops += 1;
        self.joining = false;
        Ok(())
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, WifiError> {
        self.ap_starts += 1;
        if self.fail_access_point {
            return Err(WifiError::Unsupported("access point"));
        }
        Ok(IpAddr::V4(config.address))
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, WifiError> {
        if self.fail_scan {
            return Err(WifiError::Unsupported("scan"));
        }
        Ok(self.networks.clone())
    }
}

// ==================== Portal ====================

/// Portal that hands out queued submissions.
#[derive(Debug, Default)]
pub struct FakePortal {
    /// Address and port it was started on.
    pub started: Option<(IpAddr, u16)>,
    /// `start` fails.
    pub fail_start: bool,
    /// Submissions returned by `service`, one per call.
    pub submissions: VecDeque<NetworkIdentity>,
    /// Values passed to `acknowledge`, in order.
    pub acks: Vec<bool>,
}

impl FakePortal {
    /// A stopped portal with no submissions.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProvisioningEndpoint for FakePortal {
    fn start(&mut self, address: IpAddr, port: u16) -> Result<(), PortalError> {
        if self.fail_start {
            return Err(PortalError::Bind("address in use".into()));
        }
        self.started = Some((address, port));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.started.is_some()
    }

    fn service(&mut self) -> Option<NetworkIdentity> {
        self.started?;
        self.submissions.pop_front()
    }

    fn acknowledge(&mut self, stored: bool) {
        self.acks.push(stored);
    }
}

// ==================== Storage ====================

/// Credential-sized store whose commits fail, like a worn flash page.
#[derive(Debug)]
pub struct FailingStore {
    inner: MemoryStore,
}

impl FailingStore {
    /// Empty store sized for the credential layout.
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::for_credentials(),
        }
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStore for FailingStore {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.inner.read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        self.inner.write(offset, data)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        Err(StorageError::VerificationFailed)
    }
}

// ==================== MQTT ====================

/// In-memory broker link.
#[derive(Debug, Default)]
pub struct FakeTransport {
    /// Link state.
    pub connected: bool,
    /// Calls to `connect`.
    pub connect_attempts: u32,
    /// Remaining `connect` calls that fail.
    pub fail_connects: u32,
    /// Remaining `subscribe` calls that fail (and drop the link).
    pub fail_subscribes: u32,
    /// Every `publish` fails.
    pub fail_publishes: bool,
    /// Cancel the token on this connect attempt.
    pub cancel_after: Option<(u32, CancellationToken)>,
    /// Topics subscribed, in order.
    pub subscriptions: Vec<String>,
    /// Messages published, in order.
    pub published: Vec<(String, Vec<u8>)>,
    /// Messages waiting to be received.
    pub inbound: VecDeque<InboundMessage>,
    /// Calls to `close`.
    pub closes: u32,
    /// Messages published before the first `close`.
    pub published_before_close: Option<usize>,
}

impl FakeTransport {
    /// A transport that connects on the first attempt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message from the broker.
    pub fn push_inbound(&mut self, topic: &str, payload: &str) {
        self.inbound
            .push_back(InboundMessage::new(topic, payload.as_bytes()));
    }

    /// Drop the link; the next poll fails.
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    /// Published messages as strings.
    pub fn published_strings(&self) -> Vec<(String, String)> {
        self.published
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }
}

impl MqttTransport for FakeTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_attempts += 1;
        if let Some((n, token)) = &self.cancel_after {
            if self.connect_attempts >= *n {
                token.cancel();
            }
        }
        if self.fail_connects > 0 {
            self.fail_connects -= 1;
            return Err(TransportError::Connect("connection refused".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Closed("not connected".into()));
        }
        if self.fail_subscribes > 0 {
            self.fail_subscribes -= 1;
            self.connected = false;
            return Err(TransportError::Subscribe("rejected".into()));
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.fail_publishes || !self.connected {
            return Err(TransportError::Publish("link down".into()));
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        if !self.connected {
            return Err(TransportError::Closed("link down".into()));
        }
        Ok(self.inbound.pop_front())
    }

    fn close(&mut self) {
        self.closes += 1;
        self.published_before_close.get_or_insert(self.published.len());
        self.connected = false;
    }
}

// ==================== Sensors / Actuators ====================

/// Sensors that replay a soil moisture sequence.
#[derive(Debug)]
pub struct FakeSensors {
    /// Soil readings still to be returned; the last one repeats.
    pub soil: VecDeque<f32>,
    /// Samples taken.
    pub samples: u32,
    last_soil: f32,
}

impl FakeSensors {
    /// Steady 50 % soil moisture.
    pub fn new() -> Self {
        Self::with_soil(&[])
    }

    /// Replay `readings`, then hold the last value.
    pub fn with_soil(readings: &[f32]) -> Self {
        Self {
            soil: readings.iter().copied().collect(),
            samples: 0,
            last_soil: 50.0,
        }
    }
}

impl SensorSource for FakeSensors {
    fn sample(&mut self) -> SensorSample {
        self.samples += 1;
        if let Some(next) = self.soil.pop_front() {
            self.last_soil = next;
        }
        SensorSample {
            temperature: Some(22.0),
            air_humidity: Some(60.0),
            soil_moisture_pct: self.last_soil,
            light_raw: 2000,
            water_level_pct: 75,
        }
    }
}

/// Actuators that record every applied state.
#[derive(Debug, Default)]
pub struct RecordingActuators {
    /// States applied, in order.
    pub applied: Vec<OutputState>,
}

impl RecordingActuators {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied state.
    pub fn last(&self) -> Option<OutputState> {
        self.applied.last().copied()
    }
}

impl Actuators for RecordingActuators {
    fn apply(&mut self, outputs: &OutputState) {
        self.applied.push(*outputs);
    }
}
