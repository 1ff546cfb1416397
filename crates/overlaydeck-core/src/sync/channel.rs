//! Browser `BroadcastChannel` transport for WebAssembly.
//!
//! Messages are collected by the `onmessage` callback and must be polled via
//! `poll_messages()`.

use super::protocol::SyncMessage;
use super::{BroadcastTransport, ConnectionState, SyncError};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BroadcastChannel, MessageEvent};

/// Default channel name shared by every window of the overlay.
pub const DEFAULT_CHANNEL: &str = "overlaydeck-sync";

/// Same-origin cross-tab transport.
pub struct BroadcastChannelTransport {
    channel: Option<BroadcastChannel>,
    inbox: Rc<RefCell<Vec<SyncMessage>>>,
    // Store the closure to prevent it from being dropped
    _on_message: Option<Closure<dyn Fn(MessageEvent)>>,
}

impl BroadcastChannelTransport {
    /// Open a channel by name.
    pub fn open(name: &str) -> Result<Self, SyncError> {
        let channel = BroadcastChannel::new(name)
            .map_err(|e| SyncError::Transport(format!("Failed to open BroadcastChannel: {:?}", e)))?;
        let inbox: Rc<RefCell<Vec<SyncMessage>>> = Rc::new(RefCell::new(Vec::new()));

        let inbox_msg = inbox.clone();
        let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
            let Ok(txt) = e.data().dyn_into::<js_sys::JsString>() else {
                return;
            };
            let s: String = txt.into();
            match SyncMessage::from_json(&s) {
                Ok(message) => inbox_msg.borrow_mut().push(message),
                Err(e) => log::warn!("Dropping malformed sync message: {}", e),
            }
        }) as Box<dyn Fn(MessageEvent)>);
        channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        Ok(Self {
            channel: Some(channel),
            inbox,
            _on_message: Some(on_message),
        })
    }

    /// Close the channel.
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.set_onmessage(None);
            channel.close();
        }
        self._on_message = None;
        self.inbox.borrow_mut().clear();
    }
}

impl BroadcastTransport for BroadcastChannelTransport {
    fn post(&mut self, message: &SyncMessage) -> Result<(), SyncError> {
        let Some(channel) = &self.channel else {
            return Err(SyncError::NotConnected);
        };
        let json = message.to_json()?;
        channel
            .post_message(&JsValue::from_str(&json))
            .map_err(|e| SyncError::Transport(format!("Post failed: {:?}", e)))
    }

    fn poll_messages(&mut self) -> Vec<SyncMessage> {
        std::mem::take(&mut *self.inbox.borrow_mut())
    }

    fn state(&self) -> ConnectionState {
        if self.channel.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl Drop for BroadcastChannelTransport {
    fn drop(&mut self) {
        self.close();
    }
}
