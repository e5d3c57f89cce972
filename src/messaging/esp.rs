//! ESP-IDF MQTT transport.
//!
//! `EspMqttClient` delivers events on its connection object; a small thread
//! drains it into an [`EventLink`] which [`MqttTransport::poll`] reads
//! without blocking. The client reconnects on its own after a drop, so
//! [`MqttTransport::connect`] only creates it once and afterwards waits for
//! the link to come back up.

use super::link::{EventLink, LinkEvent};
use super::session::{InboundMessage, MqttTransport, TransportError};
use crate::config::BrokerConfig;
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration, QoS,
};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_THREAD_STACK: usize = 6 * 1024;

/// Time given to the client task before it is stopped.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// MQTT transport backed by the ESP-IDF client.
pub struct EspMqttTransport {
    broker: BrokerConfig,
    client: Option<EspMqttClient<'static>>,
    link: Option<EventLink>,
}

impl EspMqttTransport {
    /// Create a transport. The client is started on the first connect.
    pub fn new(broker: BrokerConfig) -> Self {
        Self {
            broker,
            client: None,
            link: None,
        }
    }

    fn start_client(&mut self) -> Result<(), TransportError> {
        let url = self.broker.url();
        let conf = MqttClientConfiguration {
            client_id: Some(self.broker.client_id.as_str()),
            keep_alive_interval: Some(self.broker.keep_alive),
            ..Default::default()
        };

        let (client, connection) = EspMqttClient::new(&url, &conf)
            .map_err(|e| TransportError::Connect(format!("{:?}", e)))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("mqtt-events".to_string())
            .stack_size(EVENT_THREAD_STACK)
            .spawn(move || forward_events(connection, tx))
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        self.client = Some(client);
        self.link = Some(EventLink::new(rx));
        Ok(())
    }

    fn client(&mut self) -> Result<&mut EspMqttClient<'static>, TransportError> {
        match (self.client.as_mut(), self.link.as_ref()) {
            (Some(client), Some(link)) if link.is_up() => Ok(client),
            _ => Err(TransportError::Closed("not connected".into())),
        }
    }

    fn teardown(&mut self) {
        self.client = None;
        self.link = None;
    }
}

fn forward_events(mut connection: EspMqttConnection, tx: Sender<LinkEvent>) {
    while let Ok(event) = connection.next() {
        let forwarded = match event.payload() {
            EventPayload::Connected(_) => LinkEvent::Connected,
            EventPayload::Disconnected => LinkEvent::Disconnected,
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => LinkEvent::Message(InboundMessage::new(topic, data)),
            EventPayload::Error(e) => {
                warn!("MQTT event error: {:?}", e);
                continue;
            }
            _ => continue,
        };
        if tx.send(forwarded).is_err() {
            break;
        }
    }
    let _ = tx.send(LinkEvent::Closed("client stopped".into()));
    debug!("MQTT event thread finished");
}

impl MqttTransport for EspMqttTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.client.is_none() {
            info!("Connecting to broker {}", self.broker.url());
            self.start_client()?;
        }
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::Closed("event channel missing".into()));
        };

        // Returns at once when the client is still up from an earlier attempt.
        let result = link.wait_up(HANDSHAKE_TIMEOUT);
        if link.is_closed() {
            self.teardown();
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(EventLink::is_up)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client()?
            .subscribe(topic, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|e| TransportError::Subscribe(format!("{:?}", e)))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        // QoS 0 publish is written by the calling task, not queued in the outbox.
        self.client()?
            .publish(topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())
            .map_err(|e| TransportError::Publish(format!("{:?}", e)))
    }

    fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::Closed("not connected".into()));
        };
        let result = link.next_message();
        if link.is_closed() && !matches!(result, Ok(Some(_))) {
            self.teardown();
        }
        result
    }

    fn close(&mut self) {
        if self.client.is_none() {
            return;
        }
        thread::sleep(CLOSE_GRACE);
        info!("Broker connection closed");
        self.teardown();
    }
}
