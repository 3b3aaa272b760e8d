//! In-memory host for tests.
//!
//! [`RecordingHost`] implements [`ShinyHost`] without a browser. It records
//! what the crate asks of the host and lets a test play the host's part:
//! report readiness, push custom messages, and drive the registered output
//! binding the way the binding scanner would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use shiny_leptos_common::{OutputError, SetInputOptions};

use crate::binding::OutputBinding;
use crate::host::{CustomMessageHandler, Scope, ShinyHost};
use crate::lock;

/// One raw `set_input_value` call.
#[derive(Clone, Debug, PartialEq)]
pub struct SentInput {
    pub name: String,
    pub value: Value,
    pub options: SetInputOptions,
}

/// A placeholder element appended to the document body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub id: String,
    pub class: String,
}

#[derive(Default)]
struct HostState {
    initialized: bool,
    ready_callbacks: Vec<Box<dyn FnOnce() + Send>>,
    sent: Vec<SentInput>,
    message_handlers: HashMap<String, Vec<CustomMessageHandler>>,
    bindings: Vec<(String, Arc<dyn OutputBinding>)>,
    anchors: Vec<Anchor>,
    bind_passes: usize,
    unbind_passes: usize,
}

/// Host double that records every call.
///
/// The document is modelled as a flat body: anchors are direct children of
/// it, so only [`Scope::Document`] finds them.
#[derive(Default)]
pub struct RecordingHost {
    state: Mutex<HostState>,
}

impl RecordingHost {
    /// A host that has not reported readiness yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that is ready from the start.
    pub fn initialized() -> Self {
        let host = Self::default();
        lock(&host.state).initialized = true;
        host
    }

    /// Report readiness, running every queued `on_initialized` callback.
    pub fn signal_initialized(&self) {
        let callbacks = {
            let mut state = lock(&self.state);
            state.initialized = true;
            std::mem::take(&mut state.ready_callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn sent_inputs(&self) -> Vec<SentInput> {
        lock(&self.state).sent.clone()
    }

    pub fn sent_to(&self, name: &str) -> Vec<SentInput> {
        lock(&self.state)
            .sent
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    pub fn take_sent_inputs(&self) -> Vec<SentInput> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn anchors(&self) -> Vec<Anchor> {
        lock(&self.state).anchors.clone()
    }

    pub fn anchor_count(&self, id: &str) -> usize {
        lock(&self.state).anchors.iter().filter(|a| a.id == id).count()
    }

    pub fn bind_passes(&self) -> usize {
        lock(&self.state).bind_passes
    }

    pub fn unbind_passes(&self) -> usize {
        lock(&self.state).unbind_passes
    }

    pub fn message_handler_count(&self, channel: &str) -> usize {
        lock(&self.state)
            .message_handlers
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Deliver `payload` on `channel`. Returns the number of handlers run.
    pub fn push_custom_message(&self, channel: &str, payload: Value) -> usize {
        let handlers = lock(&self.state)
            .message_handlers
            .get(channel)
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// The binding registered under `name`.
    pub fn binding(&self, name: &str) -> Option<Arc<dyn OutputBinding>> {
        lock(&self.state)
            .bindings
            .iter()
            .find(|(binding_name, _)| binding_name == name)
            .map(|(_, binding)| binding.clone())
    }

    /// Drive every registered binding that finds `element_id` with a value,
    /// as the host does when an output is recomputed.
    pub fn render_value(&self, element_id: &str, data: &Value) {
        for binding in self.bindings_for(element_id) {
            binding.render_value(element_id, data);
        }
    }

    pub fn render_error(&self, element_id: &str, error: &OutputError) {
        for binding in self.bindings_for(element_id) {
            binding.render_error(element_id, error);
        }
    }

    pub fn show_progress(&self, element_id: &str, show: bool) {
        for binding in self.bindings_for(element_id) {
            binding.show_progress(element_id, show);
        }
    }

    fn bindings_for(&self, element_id: &str) -> Vec<Arc<dyn OutputBinding>> {
        let bindings: Vec<Arc<dyn OutputBinding>> = lock(&self.state)
            .bindings
            .iter()
            .map(|(_, binding)| binding.clone())
            .collect();
        bindings
            .into_iter()
            .filter(|binding| binding.find(&Scope::Document).iter().any(|id| id == element_id))
            .collect()
    }
}

impl ShinyHost for RecordingHost {
    fn on_initialized(&self, callback: Box<dyn FnOnce() + Send>) {
        let run_now = {
            let mut state = lock(&self.state);
            if state.initialized {
                Some(callback)
            } else {
                state.ready_callbacks.push(callback);
                None
            }
        };
        if let Some(callback) = run_now {
            callback();
        }
    }

    fn set_input_value(&self, name: &str, value: Value, options: SetInputOptions) {
        lock(&self.state).sent.push(SentInput {
            name: name.to_string(),
            value,
            options,
        });
    }

    fn add_custom_message_handler(&self, channel: &str, handler: CustomMessageHandler) {
        lock(&self.state)
            .message_handlers
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }

    fn register_output_binding(&self, binding: Arc<dyn OutputBinding>, binding_name: &str) {
        lock(&self.state)
            .bindings
            .push((binding_name.to_string(), binding));
    }

    fn bind_all(&self) {
        lock(&self.state).bind_passes += 1;
    }

    fn unbind_all(&self) {
        lock(&self.state).unbind_passes += 1;
    }

    fn create_anchor(&self, id: &str, class: &str) {
        lock(&self.state).anchors.push(Anchor {
            id: id.to_string(),
            class: class.to_string(),
        });
    }

    fn find_by_class(&self, scope: &Scope, class: &str) -> Vec<String> {
        match scope {
            Scope::Document => lock(&self.state)
                .anchors
                .iter()
                .filter(|a| a.class == class)
                .map(|a| a.id.clone())
                .collect(),
            Scope::Element(_) => Vec::new(),
        }
    }
}
