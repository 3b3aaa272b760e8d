//! Demultiplexing of the host's custom message channel.
//!
//! The server sends every component-level message over one custom message
//! channel as a `{type, data}` envelope. [`MessageDispatcher`] registers a
//! single host handler for that channel and routes each envelope to the
//! handlers registered for its type. Components add handlers when they mount
//! and remove them when they unmount.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use shiny_leptos_common::CustomMessage;

use crate::error::ShinyError;
use crate::host::ShinyHost;
use crate::lock;

/// Receives the `data` of every message of the type it is registered for.
pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies a registered handler so it can be removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub struct MessageDispatcher {
    host: Arc<dyn ShinyHost>,
    channel: String,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, MessageHandler)>>>,
    initialized: AtomicBool,
    next_id: AtomicU64,
}

impl MessageDispatcher {
    pub fn new(host: Arc<dyn ShinyHost>, channel: impl Into<String>) -> Self {
        Self {
            host,
            channel: channel.into(),
            handlers: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register the single channel handler with the host. Idempotent.
    pub fn init(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(target_arch = "wasm32")]
        leptos::logging::log!("[MessageDispatcher] Listening on channel '{}'", self.channel);

        let dispatcher = Arc::downgrade(self);
        self.host.add_custom_message_handler(
            &self.channel,
            Arc::new(move |raw: Value| {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    // Malformed envelopes are logged by handle_raw
                    let _ = dispatcher.handle_raw(raw);
                }
            }),
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn add_handler(self: &Arc<Self>, message_type: &str, handler: MessageHandler) -> HandlerId {
        self.init();

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers)
            .entry(message_type.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler. Types left without handlers are forgotten.
    pub fn remove_handler(&self, message_type: &str, id: HandlerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let Some(set) = handlers.get_mut(message_type) else {
            return false;
        };

        let before = set.len();
        set.retain(|(handler_id, _)| *handler_id != id);
        let removed = set.len() != before;
        if set.is_empty() {
            handlers.remove(message_type);
        }
        removed
    }

    /// Decode a raw channel payload and dispatch it.
    pub fn handle_raw(&self, raw: Value) -> Result<usize, ShinyError> {
        match serde_json::from_value::<CustomMessage>(raw) {
            Ok(message) => Ok(self.dispatch(&message)),
            Err(e) => {
                leptos::logging::warn!(
                    "[MessageDispatcher] Dropping malformed message on '{}': {}",
                    self.channel,
                    e
                );
                Err(ShinyError::MalformedMessage {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Invoke every handler registered for the message's type.
    ///
    /// Works on a snapshot: handlers added or removed by a handler take
    /// effect from the next message on. Returns the number of handlers run.
    pub fn dispatch(&self, message: &CustomMessage) -> usize {
        let handlers: Vec<MessageHandler> = lock(&self.handlers)
            .get(&message.message_type)
            .map(|set| set.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(&message.data);
        }
        handlers.len()
    }

    pub fn handler_count(&self, message_type: &str) -> usize {
        lock(&self.handlers).get(message_type).map_or(0, Vec::len)
    }

    pub fn active_message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = lock(&self.handlers).keys().cloned().collect();
        types.sort();
        types
    }
}
