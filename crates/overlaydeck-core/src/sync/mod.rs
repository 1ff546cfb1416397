//! Cross-window synchronization.
//!
//! Each window publishes its own committed transforms to its peers and to
//! durable per-widget keys, and applies what its peers publish. Store events
//! carry their origin, so changes received from a peer or restored from
//! storage are never published again.

mod bus;
mod protocol;

#[cfg(not(target_arch = "wasm32"))]
mod relay;

#[cfg(target_arch = "wasm32")]
mod channel;

pub use bus::{BusEndpoint, MemoryBus};
pub use protocol::{ClientMessage, ServerMessage, SyncMessage, WindowId};

#[cfg(not(target_arch = "wasm32"))]
pub use relay::{RELAY_ORIGIN, RelayEvent, RelayTransport};

#[cfg(target_arch = "wasm32")]
pub use channel::{BroadcastChannelTransport, DEFAULT_CHANNEL};

use crate::config::{EngineConfig, WindowRole};
use crate::gesture::GestureController;
use crate::storage::{Storage, StorageResult, load_optional};
use crate::store::{ChangeOrigin, StoreEvent, TransformStore};
use crate::transform::{WidgetId, WidgetTransform};
use std::sync::Arc;
use thiserror::Error;

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to encode message: {0}")]
    Encode(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Transport is not connected")]
    NotConnected,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A channel that reaches every other window of the session.
///
/// Delivery is poll-based: inbound messages queue up until the engine pumps.
pub trait BroadcastTransport {
    /// Send a message to every other window.
    fn post(&mut self, message: &SyncMessage) -> Result<(), SyncError>;

    /// Drain received messages (non-blocking).
    fn poll_messages(&mut self) -> Vec<SyncMessage>;

    /// Current connection state.
    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

/// One window's synchronizer.
pub struct WindowSync {
    window: WindowId,
    role: WindowRole,
    transport: Box<dyn BroadcastTransport>,
    storage: Arc<dyn Storage>,
    key_prefix: String,
    requested_state: bool,
}

impl WindowSync {
    pub fn new(
        window: WindowId,
        config: &EngineConfig,
        transport: Box<dyn BroadcastTransport>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            window,
            role: config.role,
            transport,
            storage,
            key_prefix: config.widget_key_prefix(),
            requested_state: false,
        }
    }

    /// This window's id.
    pub fn window_id(&self) -> &WindowId {
        &self.window
    }

    pub fn role(&self) -> WindowRole {
        self.role
    }

    /// Connection state of the transport.
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    fn widget_key(&self, id: &WidgetId) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Durable transform of one widget, if stored and readable.
    pub fn stored_transform(&self, id: &WidgetId) -> StorageResult<Option<WidgetTransform>> {
        match load_optional(self.storage.as_ref(), &self.widget_key(id))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Seed the store from the durable per-widget keys. Returns how many
    /// widgets were loaded; unreadable entries are skipped.
    pub fn seed(&self, store: &mut TransformStore) -> StorageResult<usize> {
        let mut seeded = Vec::new();
        for key in self.storage.list()? {
            let Some(id) = key.strip_prefix(&self.key_prefix) else {
                continue;
            };
            let id = WidgetId::new(id);
            match self.stored_transform(&id) {
                Ok(Some(transform)) => seeded.push((id, transform)),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping stored transform {}: {}", key, e),
            }
        }
        let count = seeded.len();
        store.commit(seeded, ChangeOrigin::Restored);
        log::debug!("Seeded {} widgets from storage", count);
        Ok(count)
    }

    /// Ask peers for their state. Only the first call posts.
    pub fn request_state(&mut self) -> bool {
        if self.requested_state {
            return false;
        }
        let message = SyncMessage::RequestState {
            origin: self.window.clone(),
        };
        match self.transport.post(&message) {
            Ok(()) => {
                self.requested_state = true;
                true
            }
            Err(e) => {
                log::warn!("Failed to request state: {}", e);
                false
            }
        }
    }

    /// Broadcast and persist local transform changes. Returns how many
    /// updates were posted.
    pub fn publish(&mut self, events: &[StoreEvent]) -> usize {
        let mut posted = 0;
        for event in events {
            let StoreEvent::TransformChanged { id, transform, origin } = event else {
                continue;
            };
            if !origin.is_local() {
                continue;
            }
            match serde_json::to_string(transform) {
                Ok(json) => {
                    if let Err(e) = self.storage.save(&self.widget_key(id), &json) {
                        log::warn!("Failed to persist {}: {}", id, e);
                    }
                }
                Err(e) => log::warn!("Failed to encode {}: {}", id, e),
            }
            if self.post_update(id, *transform) {
                posted += 1;
            }
        }
        posted
    }

    fn post_update(&mut self, id: &WidgetId, transform: WidgetTransform) -> bool {
        let message = SyncMessage::Update {
            widget_id: id.clone(),
            transform,
            origin: self.window.clone(),
        };
        match self.transport.post(&message) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to broadcast {}: {}", id, e);
                false
            }
        }
    }

    /// Apply messages from peers. Updates for widgets this window is
    /// manipulating, and echoes of this window's own messages, are dropped.
    /// Returns how many updates were applied.
    pub fn receive(&mut self, store: &mut TransformStore, gestures: &GestureController) -> usize {
        let mut applied = 0;
        for message in self.transport.poll_messages() {
            if *message.origin() == self.window {
                continue;
            }
            match message {
                SyncMessage::Update {
                    widget_id,
                    transform,
                    origin,
                } => {
                    if gestures.is_manipulating(&widget_id) {
                        log::debug!("Ignoring update for {} during gesture", widget_id);
                        continue;
                    }
                    store.apply_remote(&widget_id, transform, origin);
                    applied += 1;
                }
                SyncMessage::RequestState { origin } => {
                    if !self.role.is_authoritative() {
                        continue;
                    }
                    log::debug!("Answering state request from {}", origin);
                    let ids: Vec<WidgetId> = store.widget_ids().to_vec();
                    for id in ids {
                        self.post_update(&id, store.transform(&id));
                    }
                }
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::GestureScope;
    use crate::storage::MemoryStorage;
    use crate::surface::NoRects;
    use crate::transform::PartialTransform;

    fn id(s: &str) -> WidgetId {
        WidgetId::from(s)
    }

    fn window(name: &str, role: WindowRole, bus: &MemoryBus, storage: &Arc<MemoryStorage>) -> WindowSync {
        let config = EngineConfig {
            role,
            ..EngineConfig::default()
        };
        WindowSync::new(
            WindowId::from_string(name),
            &config,
            Box::new(bus.endpoint()),
            storage.clone(),
        )
    }

    #[test]
    fn test_local_change_reaches_peer_and_storage() {
        let bus = MemoryBus::new();
        let storage = Arc::new(MemoryStorage::new());
        let mut control = window("control", WindowRole::Control, &bus, &storage);
        let mut display = window("display", WindowRole::Display, &bus, &storage);
        let (mut a, mut b) = (TransformStore::default(), TransformStore::default());
        let gestures = GestureController::default();

        a.update_widget_state(&id("dice"), PartialTransform::position(0.2, 0.1));
        assert_eq!(control.publish(&a.take_events()), 1);
        assert_eq!(display.receive(&mut b, &gestures), 1);
        assert_eq!(b.transform(&id("dice")), WidgetTransform::at(0.2, 0.1));
        assert!(storage.exists("overlaydeck.widget.dice").unwrap());
    }

    #[test]
    fn test_remote_change_is_not_rebroadcast() {
        let bus = MemoryBus::new();
        let storage = Arc::new(MemoryStorage::new());
        let mut control = window("control", WindowRole::Control, &bus, &storage);
        let mut display = window("display", WindowRole::Display, &bus, &storage);
        let (mut a, mut b) = (TransformStore::default(), TransformStore::default());
        let gestures = GestureController::default();

        a.update_widget_state(&id("dice"), PartialTransform::position(0.2, 0.1));
        control.publish(&a.take_events());
        display.receive(&mut b, &gestures);

        let events = b.take_events();
        assert!(!events.is_empty());
        assert_eq!(display.publish(&events), 0);
        assert_eq!(control.receive(&mut a, &gestures), 0);
    }

    #[test]
    fn test_manipulating_window_ignores_inbound_update() {
        let bus = MemoryBus::new();
        let storage = Arc::new(MemoryStorage::new());
        let mut control = window("control", WindowRole::Control, &bus, &storage);
        let mut display = window("display", WindowRole::Display, &bus, &storage);
        let (mut a, mut b) = (TransformStore::default(), TransformStore::default());

        let mut gestures = GestureController::default();
        gestures.begin_drag(GestureScope::Widgets(vec![id("dice")]), &b, &NoRects);

        a.update_widget_state(&id("dice"), PartialTransform::position(0.3, 0.0));
        control.publish(&a.take_events());
        assert_eq!(display.receive(&mut b, &gestures), 0);
        assert_eq!(b.transform(&id("dice")), WidgetTransform::IDENTITY);
    }

    #[test]
    fn test_late_window_seeds_from_storage() {
        let bus = MemoryBus::new();
        let storage = Arc::new(MemoryStorage::new());
        let mut control = window("control", WindowRole::Control, &bus, &storage);
        let mut a = TransformStore::default();
        a.update_widget_state(&id("dice"), PartialTransform::rotation(45.0));
        a.update_widget_state(&id("coin"), PartialTransform::position(-0.1, 0.2));
        control.publish(&a.take_events());

        storage.save("overlaydeck.widget.broken", "{oops").unwrap();
        storage.save("unrelated", "1").unwrap();

        let late = window("late", WindowRole::Display, &bus, &storage);
        let mut b = TransformStore::default();
        assert_eq!(late.seed(&mut b).unwrap(), 2);
        assert_eq!(b.transform(&id("dice")).rotation, 45.0);
        assert_eq!(b.transform(&id("coin")), WidgetTransform::at(-0.1, 0.2));

        let mut late = late;
        assert_eq!(late.publish(&b.take_events()), 0);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_seed_from_files_keeps_widget_ids() {
        use crate::storage::FileStorage;

        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path().to_path_buf()).unwrap());
        let bus = MemoryBus::new();
        let config = EngineConfig::default();
        let mut control = WindowSync::new(
            WindowId::from_string("control"),
            &config,
            Box::new(bus.endpoint()),
            storage.clone(),
        );

        let mut a = TransformStore::default();
        a.update_widget_state(&id("life points"), PartialTransform::position(0.25, -0.1));
        a.update_widget_state(&id("deck/main"), PartialTransform::rotation(90.0));
        control.publish(&a.take_events());

        let late = WindowSync::new(WindowId::from_string("late"), &config, Box::new(bus.endpoint()), storage);
        let mut b = TransformStore::default();
        assert_eq!(late.seed(&mut b).unwrap(), 2);
        assert_eq!(b.transform(&id("life points")), WidgetTransform::at(0.25, -0.1));
        assert_eq!(b.transform(&id("deck/main")).rotation, 90.0);
        assert!(!b.contains(&id("life_points")));
    }

    #[test]
    fn test_only_control_answers_state_request() {
        let bus = MemoryBus::new();
        let storage = Arc::new(MemoryStorage::new());
        let mut control = window("control", WindowRole::Control, &bus, &storage);
        let mut other = window("other", WindowRole::Display, &bus, &storage);
        let gestures = GestureController::default();

        let mut a = TransformStore::default();
        a.update_widget_state(&id("dice"), PartialTransform::scale(2.0));
        a.take_events();
        let mut o = TransformStore::default();
        o.update_widget_state(&id("coin"), PartialTransform::scale(1.5));
        o.take_events();

        let mut late = window("late", WindowRole::Display, &bus, &storage);
        assert!(late.request_state());
        assert!(!late.request_state());

        control.receive(&mut a, &gestures);
        other.receive(&mut o, &gestures);

        let mut b = TransformStore::default();
        assert_eq!(late.receive(&mut b, &gestures), 1);
        assert_eq!(b.transform(&id("dice")).scale, 2.0);
        assert!(!b.contains(&id("coin")));
    }
}
