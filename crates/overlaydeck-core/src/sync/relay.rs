//! WebSocket client for the relay server (native platforms).
//!
//! The socket lives on a background thread; commands and events cross over
//! `mpsc` channels and are drained by `poll_messages`, so the engine itself
//! stays single-threaded.

use super::protocol::{ClientMessage, ServerMessage, SyncMessage, WindowId};
use super::{BroadcastTransport, ConnectionState, SyncError};
use crate::config::WindowRole;
use crate::transform::{WidgetId, WidgetTransform};
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Origin used for transforms seeded from the relay's session snapshot.
pub const RELAY_ORIGIN: &str = "relay";

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Events from the WebSocket thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected,
    Disconnected,
    Joined {
        session: String,
        peer_count: usize,
        snapshot: BTreeMap<WidgetId, WidgetTransform>,
    },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    Message(SyncMessage),
    Error { message: String },
}

impl From<ServerMessage> for RelayEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::Joined {
                session,
                peer_count,
                snapshot,
            } => Self::Joined {
                session,
                peer_count,
                snapshot,
            },
            ServerMessage::PeerJoined { peer_id } => Self::PeerJoined { peer_id },
            ServerMessage::PeerLeft { peer_id } => Self::PeerLeft { peer_id },
            ServerMessage::Error { message } => Self::Error { message },
            other => match other.into_sync() {
                Some(sync) => Self::Message(sync),
                None => Self::Error {
                    message: "Unexpected server message".to_string(),
                },
            },
        }
    }
}

/// Relay transport for native windows.
///
/// Joins `session` right after connecting; transforms in the session
/// snapshot are surfaced as updates from [`RELAY_ORIGIN`].
pub struct RelayTransport {
    state: ConnectionState,
    session: String,
    role: WindowRole,
    peer_count: usize,
    pending: Vec<SyncMessage>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<RelayEvent>>,
    /// Handle to the WebSocket thread.
    _thread: Option<JoinHandle<()>>,
}

impl RelayTransport {
    /// Create a disconnected transport for a session.
    pub fn new(session: impl Into<String>, role: WindowRole) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: session.into(),
            role,
            peer_count: 0,
            pending: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to a relay server and join the session.
    pub fn connect(&mut self, url: &str) -> Result<(), SyncError> {
        if self.cmd_tx.is_some() {
            return Err(SyncError::Transport("Already connected".to_string()));
        }

        let parsed_url = Url::parse(url).map_err(|e| SyncError::Transport(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(SyncError::Transport(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        let join = serde_json::to_string(&ClientMessage::Join {
            session: self.session.clone(),
            role: self.role,
        })?;

        self.state = ConnectionState::Connecting;
        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<RelayEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, join, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Leave the session and close the socket.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            if let Ok(leave) = serde_json::to_string(&ClientMessage::Leave) {
                let _ = tx.send(WsCommand::Send(leave));
            }
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Peers in the session, as last reported by the relay.
    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    /// Drain connection and session events; sync messages are kept for
    /// `poll_messages`.
    fn drain_events(&mut self) {
        let Some(rx) = &self.event_rx else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match event {
                RelayEvent::Connected => self.state = ConnectionState::Connected,
                RelayEvent::Disconnected => self.state = ConnectionState::Disconnected,
                RelayEvent::Error { message } => {
                    log::warn!("Relay error: {}", message);
                    self.state = ConnectionState::Error;
                }
                RelayEvent::Joined {
                    session,
                    peer_count,
                    snapshot,
                } => {
                    log::info!("Joined session {} with {} peers", session, peer_count);
                    self.peer_count = peer_count;
                    let origin = WindowId::from_string(RELAY_ORIGIN);
                    self.pending
                        .extend(snapshot.into_iter().map(|(widget_id, transform)| SyncMessage::Update {
                            widget_id,
                            transform,
                            origin: origin.clone(),
                        }));
                }
                RelayEvent::PeerJoined { peer_id } => {
                    log::debug!("Peer {} joined", peer_id);
                    self.peer_count += 1;
                }
                RelayEvent::PeerLeft { peer_id } => {
                    log::debug!("Peer {} left", peer_id);
                    self.peer_count = self.peer_count.saturating_sub(1);
                }
                RelayEvent::Message(message) => self.pending.push(message),
            }
        }
    }
}

impl BroadcastTransport for RelayTransport {
    fn post(&mut self, message: &SyncMessage) -> Result<(), SyncError> {
        let Some(tx) = &self.cmd_tx else {
            return Err(SyncError::NotConnected);
        };
        let json = serde_json::to_string(&ClientMessage::from(message.clone()))?;
        tx.send(WsCommand::Send(json))
            .map_err(|e| SyncError::Transport(format!("Send failed: {}", e)))
    }

    fn poll_messages(&mut self) -> Vec<SyncMessage> {
        self.drain_events();
        std::mem::take(&mut self.pending)
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// First 100 characters of an outgoing message, for logging.
fn preview(msg: &str) -> &str {
    match msg.char_indices().nth(100) {
        Some((end, _)) => &msg[..end],
        None => msg,
    }
}

fn run_socket(url: &str, join: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<RelayEvent>) {
    log::info!("Relay thread: connecting to {}", url);
    let (mut socket, response) = match connect(url) {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("Relay connection failed: {}", e);
            let _ = event_tx.send(RelayEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };
    log::info!("Relay connected, status: {}", response.status());
    let _ = event_tx.send(RelayEvent::Connected);

    // Short read timeout so the loop can interleave sends and reads.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    if let Err(e) = socket.send(Message::Text(join)) {
        log::error!("Relay join failed: {}", e);
        let _ = event_tx.send(RelayEvent::Disconnected);
        return;
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("Relay sending: {}", preview(&msg));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("Relay send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("Relay close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("Relay command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(message) => {
                    let _ = event_tx.send(RelayEvent::from(message));
                }
                Err(_) => log::warn!("Failed to parse relay message: {}", txt),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Relay sent close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Relay read error: {}", e);
                break;
            }
        }
    }

    log::info!("Relay thread exiting");
    let _ = event_tx.send(RelayEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_url() {
        let mut relay = RelayTransport::new("stream", WindowRole::Control);
        assert!(matches!(relay.connect("http://localhost:3030"), Err(SyncError::Transport(_))));
        assert!(matches!(relay.connect("not a url"), Err(SyncError::Transport(_))));
        assert_eq!(relay.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_post_requires_connection() {
        let mut relay = RelayTransport::new("stream", WindowRole::Display);
        let message = SyncMessage::RequestState {
            origin: WindowId::from_string("w"),
        };
        assert!(matches!(relay.post(&message), Err(SyncError::NotConnected)));
        assert!(relay.poll_messages().is_empty());
    }

    #[test]
    fn test_log_preview_respects_char_boundaries() {
        let id = "札".repeat(120);
        let msg = format!(r#"{{"type":"update","widget_id":"{}"}}"#, id);
        assert!(!msg.is_char_boundary(100));
        let shown = preview(&msg);
        assert_eq!(shown.chars().count(), 100);
        assert!(msg.starts_with(shown));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_server_messages_map_to_events() {
        let update = ServerMessage::Update {
            from: "p".to_string(),
            widget_id: WidgetId::from("dice"),
            transform: WidgetTransform::IDENTITY,
            origin: WindowId::from_string("w"),
        };
        assert!(matches!(RelayEvent::from(update), RelayEvent::Message(SyncMessage::Update { .. })));
        let left = ServerMessage::PeerLeft {
            peer_id: "p".to_string(),
        };
        assert_eq!(
            RelayEvent::from(left),
            RelayEvent::PeerLeft {
                peer_id: "p".to_string()
            }
        );
    }
}
