use std::sync::Arc;

use leptos::prelude::*;

use crate::session::ShinySession;

/// Context providing access to the Shiny session.
///
/// This context is provided by `ShinyProvider` and consumed by hooks like
/// `use_shiny_input`.
#[derive(Clone)]
pub struct ShinyContext {
    /// The session hooks register with
    pub session: Arc<ShinySession>,
    /// Flips to `true` once, when the host reports it is initialized
    pub initialized: Signal<bool>,
}

impl ShinyContext {
    pub fn new(session: Arc<ShinySession>, initialized: Signal<bool>) -> Self {
        Self {
            session,
            initialized,
        }
    }
}
