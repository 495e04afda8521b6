//! Connection state machine.

use std::sync::Arc;
use std::time::Instant;

use super::protocol::{self, ClientMessage, Inbound};
use super::{EndpointDiscovery, Transport, TransportEvent};
use crate::board::RemoteUpdate;
use crate::config::ReconnectPolicy;
use crate::entity::{Mutation, TemplateCatalog};
use crate::error::SyncError;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    /// Closed by either side.
    Closed,
    /// Discovery or the connection failed.
    Errored,
}

/// What observers are told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    Error(SyncError),
    /// The server refused a mutation.
    Rejected(String),
}

type Observer = Box<dyn FnMut(&ConnectionEvent)>;

/// Persistent connection to the board server.
pub struct SyncConnection<T: Transport> {
    transport: T,
    state: ConnectionState,
    catalog: TemplateCatalog,
    /// Set by `connect`, cleared by `disconnect`. Retries reuse it.
    discovery: Option<Arc<dyn EndpointDiscovery>>,
    reconnect: ReconnectPolicy,
    attempts: u32,
    next_retry: Option<Instant>,
    observers: Vec<Observer>,
    ping_counter: u64,
    dropped_sends: u64,
    malformed_frames: u64,
    endpoint: Option<String>,
}

impl<T: Transport> SyncConnection<T> {
    pub fn new(transport: T, catalog: TemplateCatalog, reconnect: ReconnectPolicy) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            catalog,
            discovery: None,
            reconnect,
            attempts: 0,
            next_retry: None,
            observers: Vec::new(),
            ping_counter: 0,
            dropped_sends: 0,
            malformed_frames: 0,
            endpoint: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Number of sends dropped because the connection was not open.
    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends
    }

    /// Number of inbound frames discarded as malformed.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    /// Address of the current (or last) open connection.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// When the next reconnect attempt is due, if one is scheduled.
    pub fn next_retry(&self) -> Option<Instant> {
        self.next_retry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn add_observer(&mut self, observer: impl FnMut(&ConnectionEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Discover the endpoint and open the connection. The outcome arrives
    /// through [`SyncConnection::poll`].
    pub fn connect(&mut self, discovery: Arc<dyn EndpointDiscovery>) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            log::warn!("connect() ignored: connection is {:?}", self.state);
            return;
        }
        self.discovery = Some(discovery);
        self.attempts = 0;
        self.next_retry = None;
        self.begin_open();
    }

    /// Close the connection. No reconnect until the next `connect`.
    pub fn disconnect(&mut self) {
        self.discovery = None;
        self.next_retry = None;
        self.transport.close();
        if self.state != ConnectionState::Disconnected {
            log::info!("Disconnected");
            self.set_state(ConnectionState::Closed);
        }
    }

    /// Send a mutation. Dropped (and counted) unless the connection is open.
    pub fn send(&mut self, mutation: &Mutation) {
        self.send_message(&ClientMessage::from(mutation));
    }

    /// Send a keepalive.
    pub fn ping(&mut self) {
        self.ping_counter += 1;
        self.send_message(&ClientMessage::Ping(self.ping_counter));
    }

    fn send_message(&mut self, message: &ClientMessage) {
        if self.state != ConnectionState::Open {
            self.dropped_sends += 1;
            log::warn!("Dropping send while {:?}: {message:?}", self.state);
            return;
        }
        let frame = match protocol::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                self.dropped_sends += 1;
                log::warn!("{e}");
                return;
            }
        };
        if let Err(e) = self.transport.send(frame) {
            self.dropped_sends += 1;
            log::warn!("Send failed: {e}");
        }
    }

    /// Drain transport events. Returns the decoded board updates in arrival
    /// order.
    pub fn poll(&mut self) -> Vec<RemoteUpdate> {
        self.poll_at(Instant::now())
    }

    /// [`SyncConnection::poll`] with an explicit clock, for reconnect timing.
    pub fn poll_at(&mut self, now: Instant) -> Vec<RemoteUpdate> {
        if self.next_retry.is_some_and(|due| now >= due) {
            self.next_retry = None;
            self.attempts += 1;
            log::info!(
                "Reconnect attempt {}/{}",
                self.attempts,
                self.reconnect.max_attempts
            );
            self.begin_open();
        }

        let mut updates = Vec::new();
        for event in self.transport.poll() {
            match event {
                TransportEvent::Opened { url } => {
                    log::info!("Connected to {url}");
                    self.attempts = 0;
                    self.endpoint = Some(url);
                    self.set_state(ConnectionState::Open);
                }
                TransportEvent::Frame(text) => match protocol::decode_frame(&text, &self.catalog) {
                    Ok(Inbound::Update(update)) => updates.push(update),
                    Ok(Inbound::Pong) => log::debug!("Ping reply"),
                    Ok(Inbound::Rejected(reason)) => {
                        log::warn!("Server rejected change: {reason}");
                        self.notify(&ConnectionEvent::Rejected(reason));
                    }
                    Err(e) => {
                        self.malformed_frames += 1;
                        log::warn!("{e}");
                    }
                },
                TransportEvent::Closed => {
                    if self.state != ConnectionState::Closed {
                        log::info!("Connection closed by server");
                        self.set_state(ConnectionState::Closed);
                        self.schedule_retry(now);
                    }
                }
                TransportEvent::Failed(error) => {
                    log::error!("{error}");
                    self.set_state(ConnectionState::Errored);
                    self.notify(&ConnectionEvent::Error(error));
                    self.schedule_retry(now);
                }
            }
        }
        updates
    }

    fn begin_open(&mut self) {
        let Some(discovery) = self.discovery.clone() else {
            return;
        };
        self.set_state(ConnectionState::Connecting);
        self.transport.open(discovery);
    }

    fn schedule_retry(&mut self, now: Instant) {
        if self.discovery.is_none()
            || !self.reconnect.is_enabled()
            || self.attempts >= self.reconnect.max_attempts
            || self.next_retry.is_some()
        {
            return;
        }
        let delay = self.reconnect.delay_for(self.attempts);
        log::info!("Reconnecting in {} ms", delay.as_millis());
        self.next_retry = Some(now + delay);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.notify(&ConnectionEvent::StateChanged(state));
        }
    }

    fn notify(&mut self, event: &ConnectionEvent) {
        for observer in self.observers.iter_mut() {
            observer(event);
        }
    }
}
