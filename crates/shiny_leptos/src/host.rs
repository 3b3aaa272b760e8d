use std::sync::Arc;

use serde_json::Value;
use shiny_leptos_common::SetInputOptions;

use crate::binding::OutputBinding;

/// Callback invoked with the payload of a custom message.
pub type CustomMessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Where an output binding should look for bindable elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// The whole document.
    Document,
    /// The subtree rooted at the element with this id.
    Element(String),
}

/// The Shiny client runtime this crate binds into.
///
/// The host owns the session, the transport and the server-side reactive
/// graph. This crate only pushes input values into it and receives the
/// callbacks it makes. In the browser the host is `window.Shiny`
/// (see `BrowserHost`); tests use [`RecordingHost`](crate::testing::RecordingHost).
pub trait ShinyHost: Send + Sync + 'static {
    /// Run `callback` once the host reports it is initialized. Runs
    /// immediately if it already is.
    fn on_initialized(&self, callback: Box<dyn FnOnce() + Send>);

    /// Raw, undebounced push of an input value to the server.
    fn set_input_value(&self, name: &str, value: Value, options: SetInputOptions);

    fn add_custom_message_handler(&self, channel: &str, handler: CustomMessageHandler);

    /// Make `binding` discoverable by the host's binding scanner.
    fn register_output_binding(&self, binding: Arc<dyn OutputBinding>, binding_name: &str);

    /// Rescan the document body for inputs and outputs to bind.
    fn bind_all(&self);

    /// Unbind everything in the document body.
    fn unbind_all(&self);

    /// Append a hidden placeholder element with `id` and `class` to the body.
    fn create_anchor(&self, id: &str, class: &str);

    /// Ids of the elements under `scope` carrying `class`.
    fn find_by_class(&self, scope: &Scope, class: &str) -> Vec<String>;
}
