//! OverlayDeck WebSocket Relay Server
//!
//! Relays committed widget transforms between overlay windows that do not
//! share a browser, e.g. a control panel on one machine and a capture
//! window on another.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "session": "stream", "role": "display" }
//! { "type": "update", "widget_id": "dice", "transform": { "px": 0.1, "py": 0.0, "scale": 1.0, "rotation": 0.0 }, "origin": "<window-id>" }
//! { "type": "request_state", "origin": "<window-id>" }
//! ```
//!
//! The relay remembers the last transform of every widget per session and
//! hands it to each window that joins. State requests go to the session's
//! control window; without one, the relay answers from what it remembers.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use overlaydeck_core::config::WindowRole;
use overlaydeck_core::sync::{ClientMessage, RELAY_ORIGIN, ServerMessage, WindowId};
use overlaydeck_core::transform::{WidgetId, WidgetTransform};
use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::Arc,
};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server configuration
const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ADDR: &str = "0.0.0.0:3030";
const ADDR_ENV: &str = "OVERLAYDECK_RELAY_ADDR";

type SessionSender = broadcast::Sender<(String, ServerMessage)>;
type SessionReceiver = broadcast::Receiver<(String, ServerMessage)>;

/// Session state
struct Session {
    /// Broadcast channel for this session
    tx: SessionSender,
    /// Connected peers and the role each joined with
    peers: HashMap<String, WindowRole>,
    /// Last transform of every widget (for new joiners)
    transforms: BTreeMap<WidgetId, WidgetTransform>,
}

impl Session {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashMap::new(),
            transforms: BTreeMap::new(),
        }
    }
}

/// What a peer receives when joining a session.
struct JoinTicket {
    rx: SessionReceiver,
    peer_count: usize,
    snapshot: BTreeMap<WidgetId, WidgetTransform>,
}

/// Shared application state
struct AppState {
    /// Active sessions
    sessions: DashMap<String, Session>,
}

impl AppState {
    fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Add peer to session
    fn join_session(&self, session: &str, peer_id: &str, role: WindowRole) -> JoinTicket {
        let mut entry = self.sessions.entry(session.to_string()).or_insert_with(Session::new);
        entry.peers.insert(peer_id.to_string(), role);
        JoinTicket {
            rx: entry.tx.subscribe(),
            peer_count: entry.peers.len(),
            snapshot: entry.transforms.clone(),
        }
    }

    /// Remove peer from session
    fn leave_session(&self, session: &str, peer_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session) {
            entry.peers.remove(peer_id);
            // Clean up empty sessions
            if entry.peers.is_empty() {
                drop(entry);
                self.sessions.remove(session);
            }
        }
    }

    /// Remember a widget's latest transform
    fn record_transform(&self, session: &str, widget_id: WidgetId, transform: WidgetTransform) {
        if let Some(mut entry) = self.sessions.get_mut(session) {
            entry.transforms.insert(widget_id, transform);
        }
    }

    /// Broadcast message to session
    fn broadcast(&self, session: &str, from: &str, msg: ServerMessage) {
        if let Some(entry) = self.sessions.get(session) {
            let _ = entry.tx.send((from.to_string(), msg));
        }
    }

    /// Updates the relay sends itself in reply to a state request, or `None`
    /// when a control window is present to answer.
    fn state_reply(&self, session: &str) -> Option<Vec<ServerMessage>> {
        let entry = self.sessions.get(session)?;
        if entry.peers.values().any(WindowRole::is_authoritative) {
            return None;
        }
        let origin = WindowId::from_string(RELAY_ORIGIN);
        Some(
            entry
                .transforms
                .iter()
                .map(|(widget_id, transform)| ServerMessage::Update {
                    from: RELAY_ORIGIN.to_string(),
                    widget_id: widget_id.clone(),
                    transform: *transform,
                    origin: origin.clone(),
                })
                .collect(),
        )
    }

    fn peer_count(&self, session: &str) -> usize {
        self.sessions.get(session).map(|entry| entry.peers.len()).unwrap_or(0)
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn encode(msg: &ServerMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to encode server message: {}", e);
            None
        }
    }
}

fn listen_addr() -> Result<SocketAddr, std::net::AddrParseError> {
    std::env::var(ADDR_ENV)
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "overlaydeck_relay=info,tower_http=info".into()),
        )
        .init();

    let addr = match listen_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid {}: {}", ADDR_ENV, e);
            return;
        }
    };

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("OverlayDeck relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}

/// Index page
async fn index() -> &'static str {
    "OverlayDeck Relay - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_session: Option<String> = None;
    let mut session_rx: Option<SessionReceiver> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Join { session, role }) => {
                                if let Some(ref old) = current_session {
                                    state.leave_session(old, &peer_id);
                                    state.broadcast(old, &peer_id, ServerMessage::PeerLeft {
                                        peer_id: peer_id.clone(),
                                    });
                                }

                                let ticket = state.join_session(&session, &peer_id, role);
                                session_rx = Some(ticket.rx);
                                current_session = Some(session.clone());

                                let joined = ServerMessage::Joined {
                                    session: session.clone(),
                                    peer_count: ticket.peer_count,
                                    snapshot: ticket.snapshot,
                                };
                                let Some(json) = encode(&joined) else { break };
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }

                                state.broadcast(&session, &peer_id, ServerMessage::PeerJoined {
                                    peer_id: peer_id.clone(),
                                });

                                info!("Peer {} joined session {} as {:?}", peer_id, session, role);
                            }
                            Ok(ClientMessage::Leave) => {
                                if let Some(ref session) = current_session {
                                    state.leave_session(session, &peer_id);
                                    state.broadcast(session, &peer_id, ServerMessage::PeerLeft {
                                        peer_id: peer_id.clone(),
                                    });
                                    info!("Peer {} left session {}", peer_id, session);
                                }
                                current_session = None;
                                session_rx = None;
                            }
                            Ok(ClientMessage::Update { widget_id, transform, origin }) => {
                                if let Some(ref session) = current_session {
                                    state.record_transform(session, widget_id.clone(), transform);
                                    state.broadcast(session, &peer_id, ServerMessage::Update {
                                        from: peer_id.clone(),
                                        widget_id,
                                        transform,
                                        origin,
                                    });
                                }
                            }
                            Ok(ClientMessage::RequestState { origin }) => {
                                let Some(ref session) = current_session else { continue };
                                debug!("State request from {} in session {}", origin, session);
                                let Some(updates) = state.state_reply(session) else {
                                    state.broadcast(session, &peer_id, ServerMessage::RequestState {
                                        from: peer_id.clone(),
                                        origin,
                                    });
                                    continue;
                                };
                                let mut closed = false;
                                for update in updates {
                                    let Some(json) = encode(&update) else { continue };
                                    if sender.send(Message::Text(json.into())).await.is_err() {
                                        closed = true;
                                        break;
                                    }
                                }
                                if closed {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                if let Some(json) = encode(&err) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary/ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Handle broadcast messages from session
            msg = async {
                match &mut session_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => std::future::pending::<Option<(String, ServerMessage)>>().await,
                }
            } => {
                if let Some((from, server_msg)) = msg {
                    // Don't echo back to sender
                    if from != peer_id {
                        let Some(json) = encode(&server_msg) else { continue };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref session) = current_session {
        state.leave_session(session, &peer_id);
        state.broadcast(session, &peer_id, ServerMessage::PeerLeft {
            peer_id: peer_id.clone(),
        });
    }
    info!("Connection closed: {}", peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dice() -> WidgetId {
        WidgetId::from("dice")
    }

    #[test]
    fn test_join_counts_peers() {
        let state = AppState::new();
        let first = state.join_session("stream", "a", WindowRole::Control);
        assert_eq!(first.peer_count, 1);
        assert!(first.snapshot.is_empty());
        let second = state.join_session("stream", "b", WindowRole::Display);
        assert_eq!(second.peer_count, 2);
        assert_eq!(state.session_count(), 1);
    }

    #[test]
    fn test_late_joiner_gets_last_transforms() {
        let state = AppState::new();
        let _control = state.join_session("stream", "a", WindowRole::Control);
        state.record_transform("stream", dice(), WidgetTransform::at(0.1, 0.2));
        state.record_transform("stream", dice(), WidgetTransform::at(0.3, -0.1));

        let late = state.join_session("stream", "b", WindowRole::Display);
        assert_eq!(late.snapshot.len(), 1);
        assert_eq!(late.snapshot[&dice()], WidgetTransform::at(0.3, -0.1));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let state = AppState::new();
        let _a = state.join_session("one", "a", WindowRole::Control);
        let _b = state.join_session("two", "b", WindowRole::Control);
        state.record_transform("one", dice(), WidgetTransform::at(0.1, 0.1));

        let c = state.join_session("two", "c", WindowRole::Display);
        assert!(c.snapshot.is_empty());
        assert_eq!(state.peer_count("one"), 1);
        assert_eq!(state.peer_count("two"), 2);
    }

    #[test]
    fn test_empty_session_is_dropped() {
        let state = AppState::new();
        let _a = state.join_session("stream", "a", WindowRole::Control);
        state.record_transform("stream", dice(), WidgetTransform::at(0.1, 0.1));
        state.leave_session("stream", "a");
        assert_eq!(state.session_count(), 0);

        let fresh = state.join_session("stream", "b", WindowRole::Control);
        assert!(fresh.snapshot.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let state = AppState::new();
        let mut a = state.join_session("stream", "a", WindowRole::Control);
        let _b = state.join_session("stream", "b", WindowRole::Display);
        state.broadcast(
            "stream",
            "b",
            ServerMessage::PeerJoined {
                peer_id: "b".to_string(),
            },
        );
        let (from, msg) = a.rx.try_recv().unwrap();
        assert_eq!(from, "b");
        assert_eq!(
            msg,
            ServerMessage::PeerJoined {
                peer_id: "b".to_string()
            }
        );
    }

    #[test]
    fn test_state_request_goes_to_control_window() {
        let state = AppState::new();
        let _control = state.join_session("stream", "a", WindowRole::Control);
        let _display = state.join_session("stream", "b", WindowRole::Display);
        state.record_transform("stream", dice(), WidgetTransform::at(0.1, 0.2));
        assert!(state.state_reply("stream").is_none());
    }

    #[test]
    fn test_relay_answers_state_request_without_control_window() {
        let state = AppState::new();
        let _display = state.join_session("stream", "b", WindowRole::Display);
        state.record_transform("stream", dice(), WidgetTransform::at(0.1, 0.2));

        let reply = state.state_reply("stream").unwrap();
        assert_eq!(
            reply,
            vec![ServerMessage::Update {
                from: RELAY_ORIGIN.to_string(),
                widget_id: dice(),
                transform: WidgetTransform::at(0.1, 0.2),
                origin: WindowId::from_string(RELAY_ORIGIN),
            }]
        );

        // Once the control window leaves, the relay takes over again.
        let _control = state.join_session("stream", "a", WindowRole::Control);
        assert!(state.state_reply("stream").is_none());
        state.leave_session("stream", "a");
        assert_eq!(state.state_reply("stream").map(|r| r.len()), Some(1));
        assert!(state.state_reply("ghost").is_none());
    }

    #[test]
    fn test_update_for_unknown_session_is_ignored() {
        let state = AppState::new();
        state.record_transform("ghost", dice(), WidgetTransform::IDENTITY);
        assert_eq!(state.session_count(), 0);
    }
}
