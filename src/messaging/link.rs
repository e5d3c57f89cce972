//! Event channel between a client's connection thread and its transport.
//!
//! Both platform clients deliver connection events on a blocking iterator.
//! A forwarding thread turns them into [`LinkEvent`]s; the transport reads
//! them through an [`EventLink`] without blocking the control loop, and the
//! link keeps track of whether the broker connection is up.

use super::session::{InboundMessage, TransportError};
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

/// Connection event forwarded from a client thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkEvent {
    /// Broker accepted the connection.
    Connected,
    /// Broker connection lost; the client may come back on its own.
    Disconnected,
    /// A queued publish was written to the socket.
    Sent,
    /// Message received on a subscribed topic.
    Message(InboundMessage),
    /// The client stopped for good.
    Closed(String),
}

/// Receiving side of a client's event thread.
#[derive(Debug)]
pub(crate) struct EventLink {
    events: Receiver<LinkEvent>,
    pending: VecDeque<InboundMessage>,
    up: bool,
    closed: Option<String>,
    queued: usize,
    sent: usize,
}

impl EventLink {
    pub(crate) fn new(events: Receiver<LinkEvent>) -> Self {
        Self {
            events,
            pending: VecDeque::new(),
            up: false,
            closed: None,
            queued: 0,
            sent: 0,
        }
    }

    /// Whether the broker connection is up, as of the last event read.
    pub(crate) fn is_up(&self) -> bool {
        self.up && self.closed.is_none()
    }

    /// Whether the client thread has stopped.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    fn closed_error(&self) -> Option<TransportError> {
        self.closed.clone().map(TransportError::Closed)
    }

    /// Record a publish handed to the client.
    pub(crate) fn note_queued(&mut self) {
        self.queued += 1;
    }

    /// Publishes handed to the client but not yet written.
    pub(crate) fn unsent(&self) -> usize {
        self.queued.saturating_sub(self.sent)
    }

    fn apply(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => self.up = true,
            LinkEvent::Disconnected => self.up = false,
            LinkEvent::Sent => self.sent += 1,
            LinkEvent::Message(msg) => self.pending.push_back(msg),
            LinkEvent::Closed(reason) => {
                self.up = false;
                self.closed.get_or_insert(reason);
            }
        }
    }

    /// Read every event already delivered.
    fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.apply(LinkEvent::Closed("event thread stopped".into()));
                    return;
                }
            }
        }
    }

    /// Block until the broker connection is up.
    ///
    /// Returns at once when it already is, so a handshake retried after a
    /// failed subscribe does not wait for a connect event that never comes.
    pub(crate) fn wait_up(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.drain();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(e) = self.closed_error() {
                return Err(e);
            }
            if self.up {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    self.apply(LinkEvent::Closed("event thread stopped".into()));
                }
            }
        }
    }

    /// Next received message. Never blocks.
    pub(crate) fn next_message(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        self.drain();
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        if let Some(e) = self.closed_error() {
            return Err(e);
        }
        if !self.up {
            return Err(TransportError::Closed("broker disconnected".into()));
        }
        Ok(None)
    }

    /// Wait until every queued publish has been written, or `timeout`.
    ///
    /// Returns whether everything went out.
    pub(crate) fn flush(&mut self, timeout: Duration) -> bool {
        self.drain();
        let deadline = Instant::now() + timeout;
        while self.unsent() > 0 && !self.is_closed() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.apply(LinkEvent::Closed("event thread stopped".into()))
                }
            }
        }
        self.unsent() == 0
    }

    /// Wait for the client thread to stop, or `timeout`.
    pub(crate) fn wait_closed(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_closed() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.apply(LinkEvent::Closed("event thread stopped".into()))
                }
            }
        }
        self.is_closed()
    }
}
