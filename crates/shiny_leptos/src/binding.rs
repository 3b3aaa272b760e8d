use std::sync::Arc;

use serde_json::Value;
use shiny_leptos_common::OutputError;

use crate::host::Scope;
use crate::registry::ReactiveRegistry;

/// The capabilities the host needs from an output binding.
///
/// The host discovers bindable elements with [`find`](Self::find) and then
/// drives each one by element id as the server recomputes it.
pub trait OutputBinding: Send + Sync + 'static {
    fn find(&self, scope: &Scope) -> Vec<String>;

    /// A new value arrived for the output bound to `element_id`.
    fn render_value(&self, element_id: &str, data: &Value);

    /// The server failed to compute the output bound to `element_id`.
    fn render_error(&self, element_id: &str, error: &OutputError);

    /// The server started (`true`) or finished (`false`) recomputing.
    fn show_progress(&self, element_id: &str, show: bool);
}

/// Output binding that routes host callbacks into a [`ReactiveRegistry`].
///
/// Anchors are created by [`ReactiveRegistry::register_output`] with the
/// element id equal to the output name, so the element id is all that is
/// needed to find the subscribers.
pub struct RegistryOutputBinding {
    registry: Arc<ReactiveRegistry>,
}

impl RegistryOutputBinding {
    pub fn new(registry: Arc<ReactiveRegistry>) -> Self {
        Self { registry }
    }
}

impl OutputBinding for RegistryOutputBinding {
    fn find(&self, scope: &Scope) -> Vec<String> {
        self.registry
            .host()
            .find_by_class(scope, self.registry.config().output_class())
    }

    fn render_value(&self, element_id: &str, data: &Value) {
        // Failures are logged by the registry
        let _ = self.registry.render_output(element_id, data);
    }

    fn render_error(&self, element_id: &str, error: &OutputError) {
        leptos::logging::error!("[RegistryOutputBinding] Error for {}: {}", element_id, error);
    }

    fn show_progress(&self, element_id: &str, show: bool) {
        let _ = self.registry.set_output_busy(element_id, show);
    }
}
