//! In-process broadcast bus.
//!
//! Behaves like a browser `BroadcastChannel`: a message posted by one endpoint
//! reaches every other connected endpoint, never the sender. Messages travel
//! as JSON so the wire format is exercised the same way.

use super::protocol::SyncMessage;
use super::{BroadcastTransport, ConnectionState, SyncError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Inbox = Rc<RefCell<VecDeque<String>>>;

#[derive(Debug, Default)]
struct BusInner {
    next_id: u64,
    /// Connected endpoints and their inboxes.
    endpoints: Vec<(u64, Inbox)>,
}

/// A named in-process channel.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Rc<RefCell<BusInner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connected endpoint.
    pub fn endpoint(&self) -> BusEndpoint {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_id += 1;
            inner.next_id
        };
        let mut endpoint = BusEndpoint {
            id,
            bus: self.clone(),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            connected: false,
        };
        endpoint.connect();
        endpoint
    }

    /// Number of connected endpoints.
    pub fn connected_count(&self) -> usize {
        self.inner.borrow().endpoints.len()
    }
}

/// One window's end of a [`MemoryBus`].
#[derive(Debug)]
pub struct BusEndpoint {
    id: u64,
    bus: MemoryBus,
    inbox: Inbox,
    connected: bool,
}

impl BusEndpoint {
    /// Start receiving messages. Messages posted while disconnected are lost.
    pub fn connect(&mut self) {
        if self.connected {
            return;
        }
        self.bus.inner.borrow_mut().endpoints.push((self.id, self.inbox.clone()));
        self.connected = true;
    }

    /// Stop receiving messages and drop anything not yet polled.
    pub fn disconnect(&mut self) {
        self.bus.inner.borrow_mut().endpoints.retain(|(id, _)| *id != self.id);
        self.inbox.borrow_mut().clear();
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl BroadcastTransport for BusEndpoint {
    fn post(&mut self, message: &SyncMessage) -> Result<(), SyncError> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        let json = message.to_json()?;
        for (id, inbox) in &self.bus.inner.borrow().endpoints {
            if *id != self.id {
                inbox.borrow_mut().push_back(json.clone());
            }
        }
        Ok(())
    }

    fn poll_messages(&mut self) -> Vec<SyncMessage> {
        let raw: Vec<String> = self.inbox.borrow_mut().drain(..).collect();
        raw.iter()
            .filter_map(|json| match SyncMessage::from_json(json) {
                Ok(message) => Some(message),
                Err(e) => {
                    log::warn!("Dropping malformed sync message: {}", e);
                    None
                }
            })
            .collect()
    }

    fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        self.disconnect();
    }
}
