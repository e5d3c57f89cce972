//! `rumqttc` transport for host builds.
//!
//! The blocking client only makes progress while its `Connection` is
//! iterated: that is where the socket is read, queued requests are written
//! and keep-alive pings are sent. A forwarding thread owns the connection
//! and iterates it for the life of the client, passing events to the
//! control loop over an [`EventLink`].

use super::link::{EventLink, LinkEvent};
use super::session::{InboundMessage, MqttTransport, TransportError};
use crate::config::BrokerConfig;
use log::{debug, info, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

/// Request queue depth of the client.
const CHANNEL_CAPACITY: usize = 20;

/// How long to wait for the broker's CONNACK.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long [`MqttTransport::close`] waits for queued publishes.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT transport backed by `rumqttc`.
pub struct RumqttTransport {
    broker: BrokerConfig,
    client: Option<Client>,
    link: Option<EventLink>,
}

impl RumqttTransport {
    /// Create a transport for the given broker. Nothing is opened until
    /// [`MqttTransport::connect`].
    pub fn new(broker: BrokerConfig) -> Self {
        Self {
            broker,
            client: None,
            link: None,
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.broker.client_id.clone(),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(self.broker.keep_alive);
        options.set_clean_session(true);
        options
    }

    fn client(&self) -> Result<&Client, TransportError> {
        match (self.client.as_ref(), self.link.as_ref()) {
            (Some(client), Some(link)) if link.is_up() => Ok(client),
            _ => Err(TransportError::Closed("not connected".into())),
        }
    }

    fn teardown(&mut self) {
        // Dropping the client ends the event loop and with it the thread.
        self.client = None;
        self.link = None;
    }
}

fn forward_events(mut connection: Connection, tx: Sender<LinkEvent>) {
    for notification in connection.iter() {
        let forwarded = match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!("CONNACK: {:?}", ack.code);
                LinkEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                LinkEvent::Message(InboundMessage::new(publish.topic, publish.payload.to_vec()))
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                let _ = tx.send(LinkEvent::Closed("broker sent DISCONNECT".into()));
                break;
            }
            Ok(Event::Outgoing(Outgoing::Publish(_))) => LinkEvent::Sent,
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = tx.send(LinkEvent::Closed("disconnect sent".into()));
                break;
            }
            // Acks, pings and other outgoing notifications
            Ok(_) => continue,
            Err(e) => {
                // The iterator would reconnect on its own; a fresh client is
                // made per connect attempt instead.
                let _ = tx.send(LinkEvent::Closed(e.to_string()));
                break;
            }
        };
        if tx.send(forwarded).is_err() {
            break;
        }
    }
    debug!("MQTT event thread finished");
}

impl MqttTransport for RumqttTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        // Still up from an earlier handshake whose subscribe failed.
        if let Some(link) = self.link.as_mut() {
            if link.wait_up(Duration::ZERO).is_ok() {
                return Ok(());
            }
        }
        self.teardown();

        info!("Connecting to broker {}", self.broker.address());
        let (client, connection) = Client::new(self.options(), CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("mqtt-events".to_string())
            .spawn(move || forward_events(connection, tx))
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let mut link = EventLink::new(rx);
        link.wait_up(HANDSHAKE_TIMEOUT)?;

        self.client = Some(client);
        self.link = Some(link);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(EventLink::is_up)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client()?
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.client()?
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        if let Some(link) = self.link.as_mut() {
            link.note_queued();
        }
        Ok(())
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
        let (Some(client), Some(link)) = (self.client.as_ref(), self.link.as_mut()) else {
            return;
        };
        if !link.flush(FLUSH_TIMEOUT) {
            warn!("{} publishes not written before close", link.unsent());
        }
        if client.try_disconnect().is_ok() {
            link.wait_closed(FLUSH_TIMEOUT);
        }
        info!("Broker connection closed");
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::topics::{CONNECTION_STATUS, PUMP_CONTROL};
    use std::io::{self, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;
    use std::time::Instant;

    const CONNECT: u8 = 1;
    const PUBLISH: u8 = 3;
    const SUBSCRIBE: u8 = 8;
    const DISCONNECT: u8 = 14;

    type Packets = Vec<(u8, Vec<u8>)>;

    fn read_packet(stream: &mut TcpStream) -> io::Result<(u8, Vec<u8>)> {
        let mut header = [0u8; 1];
        stream.read_exact(&mut header)?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte)?;
            len |= usize::from(byte[0] & 0x7f) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;
        Ok((header[0] >> 4, body))
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);
        let mut packet = vec![0x30, body.len() as u8];
        packet.extend(body);
        packet
    }

    /// Minimal broker on 127.0.0.1:0: accepts one client, answers CONNECT
    /// and records every later packet until the client goes away.
    fn fake_broker<F>(mut on_packet: F) -> (u16, JoinHandle<Packets>)
    where
        F: FnMut(u8, &[u8], &mut TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let (kind, _) = read_packet(&mut stream).unwrap();
            assert_eq!(kind, CONNECT);
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();

            let mut packets = Vec::new();
            while let Ok((kind, body)) = read_packet(&mut stream) {
                on_packet(kind, &body, &mut stream);
                packets.push((kind, body));
            }
            packets
        });
        (port, handle)
    }

    fn local_broker(port: u16) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..BrokerConfig::default()
        }
    }

    // ==================== State Tests ====================

    #[test]
    fn test_not_connected_until_handshake() {
        let mut transport = RumqttTransport::new(BrokerConfig::default());
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("invernadero/luz", b"1"),
            Err(TransportError::Closed(_))
        ));
        assert!(matches!(
            transport.subscribe("invernadero/control_bomba"),
            Err(TransportError::Closed(_))
        ));
        assert!(transport.poll().is_err());
        transport.close();
    }

    #[test]
    fn test_options_from_broker_config() {
        let transport = RumqttTransport::new(BrokerConfig::default());
        let options = transport.options();
        assert_eq!(options.client_id(), "ESP32ClientInvernadero");
        assert_eq!(
            options.broker_address(),
            ("broker.hivemq.com".to_string(), 1883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(15));
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = RumqttTransport::new(local_broker(port));
        assert!(transport.connect().is_err());
        assert!(!transport.is_connected());
    }

    // ==================== Socket Tests ====================

    #[test]
    fn test_inbound_publish_reaches_poll() {
        let (port, broker) = fake_broker(|kind, body, stream| {
            if kind == SUBSCRIBE {
                stream
                    .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
                    .unwrap();
                thread::sleep(Duration::from_millis(200));
                stream
                    .write_all(&publish_packet(PUMP_CONTROL, b"ON"))
                    .unwrap();
            }
        });

        let mut transport = RumqttTransport::new(local_broker(port));
        transport.connect().unwrap();
        assert!(transport.is_connected());
        transport.subscribe(PUMP_CONTROL).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            received = transport.poll().unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(received, Some(InboundMessage::new(PUMP_CONTROL, "ON")));
        assert!(transport.is_connected());

        drop(transport);
        let packets = broker.join().unwrap();
        assert_eq!(packets.first().map(|(kind, _)| *kind), Some(SUBSCRIBE));
    }

    #[test]
    fn test_close_writes_queued_publish_first() {
        let (port, broker) = fake_broker(|_, _, _| {});

        let mut transport = RumqttTransport::new(local_broker(port));
        transport.connect().unwrap();
        transport
            .publish(CONNECTION_STATUS, b"CREDENCIALES RECIBIDAS - REINICIANDO")
            .unwrap();
        transport.close();
        assert!(!transport.is_connected());

        let packets = broker.join().unwrap();
        let publish = packets
            .iter()
            .position(|(kind, body)| {
                *kind == PUBLISH && body.ends_with(b"CREDENCIALES RECIBIDAS - REINICIANDO")
            })
            .expect("status publish reached the broker");
        if let Some(disconnect) = packets.iter().position(|(kind, _)| *kind == DISCONNECT) {
            assert!(publish < disconnect);
        }
    }
}
