//! Native websocket transport.
//!
//! Discovery, the websocket handshake and all socket I/O run on a
//! background thread. The owning thread talks to it over channels and only
//! learns about results when it polls.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tungstenite::handshake::client::Response;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::protocol::preview;
use super::{EndpointDiscovery, Transport, TransportEvent};
use crate::error::{SyncError, SyncResult};

/// Read timeout on the socket; bounds how long a queued send waits.
const READ_TIMEOUT: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on the TCP connect and the websocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Commands sent to the websocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Websocket client for native platforms.
pub struct WsTransport {
    connect_timeout: Duration,
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<TransportEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, discovery: Arc<dyn EndpointDiscovery>) {
        // Replace any previous connection
        self.close();

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();

        let timeout = self.connect_timeout;
        let handle = thread::spawn(move || run_socket(discovery, timeout, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
    }

    fn send(&mut self, frame: String) -> SyncResult<()> {
        match self.cmd_tx {
            Some(ref tx) => tx
                .send(WsCommand::Send(frame))
                .map_err(|e| SyncError::Connection(format!("Send failed: {e}"))),
            None => Err(SyncError::DroppedSend),
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let mut finished = false;
        if let Some(ref rx) = self.event_rx {
            loop {
                match rx.try_recv() {
                    Ok(event) => {
                        if matches!(event, TransportEvent::Closed | TransportEvent::Failed(_)) {
                            finished = true;
                        }
                        events.push(event);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        // Worker exited without saying goodbye
                        if !finished {
                            events.push(TransportEvent::Failed(SyncError::Connection(
                                "Connection thread exited".to_string(),
                            )));
                        }
                        finished = true;
                        break;
                    }
                }
            }
        }
        if finished {
            self.cmd_tx = None;
            self.event_rx = None;
            self._thread = None;
        }
        events
    }

    fn close(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect with a bounded TCP connect and handshake.
fn open_socket(url: &str, timeout: Duration) -> SyncResult<(Socket, Response)> {
    let parsed =
        Url::parse(url).map_err(|e| SyncError::Connection(format!("Invalid URL '{url}': {e}")))?;
    let addrs = parsed
        .socket_addrs(|| None)
        .map_err(|e| SyncError::Connection(format!("Cannot resolve {url}: {e}")))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                let _ = stream.set_read_timeout(Some(timeout));
                let _ = stream.set_write_timeout(Some(timeout));
                return tungstenite::client_tls(url, stream)
                    .map_err(|e| SyncError::Connection(format!("Handshake with {url} failed: {e}")));
            }
            Err(e) => {
                log::debug!("Connect to {addr} failed: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(SyncError::Connection(match last_error {
        Some(e) => format!("Connect to {url} failed: {e}"),
        None => format!("No addresses for {url}"),
    }))
}

fn run_socket(
    discovery: Arc<dyn EndpointDiscovery>,
    connect_timeout: Duration,
    cmd_rx: Receiver<WsCommand>,
    event_tx: Sender<TransportEvent>,
) {
    let url = match discovery.discover() {
        Ok(url) => url,
        Err(e) => {
            log::error!("{e}");
            let _ = event_tx.send(TransportEvent::Failed(e));
            return;
        }
    };

    log::info!("WebSocket thread: connecting to {url}");
    let (mut socket, response) = match open_socket(&url, connect_timeout) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("WebSocket connection failed: {e}");
            let _ = event_tx.send(TransportEvent::Failed(e));
            return;
        }
    };
    log::info!("WebSocket connected, status: {}", response.status());

    match socket.get_mut() {
        MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
            let _ = tcp.set_write_timeout(Some(WRITE_TIMEOUT));
        }
        #[allow(unreachable_patterns)]
        _ => {
            log::debug!("TLS or other stream - using default timeout handling");
        }
    }

    if event_tx.send(TransportEvent::Opened { url }).is_err() {
        return;
    }

    let outcome = loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(frame)) => {
                log::debug!("WebSocket sending: {}", preview(&frame));
                if let Err(e) = socket.send(Message::Text(frame)) {
                    break TransportEvent::Failed(SyncError::Connection(e.to_string()));
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break TransportEvent::Closed;
            }
            Err(TryRecvError::Disconnected) => {
                let _ = socket.close(None);
                break TransportEvent::Closed;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                log::debug!("WebSocket received: {}", preview(&text));
                if event_tx.send(TransportEvent::Frame(text)).is_err() {
                    let _ = socket.close(None);
                    break TransportEvent::Closed;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break TransportEvent::Closed;
            }
            Ok(_) => {} // Ignore binary, pong
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(tungstenite::Error::ConnectionClosed) => break TransportEvent::Closed,
            Err(e) => {
                log::error!("WebSocket read error: {e}");
                break TransportEvent::Failed(SyncError::Connection(e.to_string()));
            }
        }
    };

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(outcome);
}
