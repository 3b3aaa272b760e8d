use std::sync::Arc;

use leptos::prelude::*;

use crate::config::ShinyConfig;
use crate::context::ShinyContext;
use crate::host::ShinyHost;
use crate::scheduler::Scheduler;
use crate::session::ShinySession;

/// Provider component that starts a Shiny session and provides ShinyContext.
///
/// This component should wrap the part of your application that uses the
/// `use_shiny_*` hooks. The session is torn down when the provider unmounts.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use shiny_leptos::{BrowserHost, ShinyProvider};
///
/// #[component]
/// pub fn App() -> impl IntoView {
///     view! {
///         <ShinyProvider host=Arc::new(BrowserHost::new())>
///             <MyAppUI />
///         </ShinyProvider>
///     }
/// }
/// ```
#[component]
pub fn ShinyProvider(
    /// The Shiny runtime to bind into
    host: Arc<dyn ShinyHost>,
    /// Timer source (default: the browser's timers on wasm32)
    #[prop(optional)]
    scheduler: Option<Arc<dyn Scheduler>>,
    /// Session settings (default: `ShinyConfig::default()`)
    #[prop(optional)]
    config: Option<ShinyConfig>,
    /// Child components
    children: Children,
) -> impl IntoView {
    let scheduler = resolve_scheduler(scheduler);
    let session = ShinySession::new(host, scheduler, config.unwrap_or_default());

    let initialized = RwSignal::new(false);
    session.on_ready(Box::new(move || {
        initialized.try_set(true);
    }));
    session.start();

    provide_context(ShinyContext::new(session.clone(), initialized.into()));

    on_cleanup(move || session.teardown());

    children()
}

fn resolve_scheduler(scheduler: Option<Arc<dyn Scheduler>>) -> Arc<dyn Scheduler> {
    scheduler.unwrap_or_else(default_scheduler)
}

#[cfg(target_arch = "wasm32")]
fn default_scheduler() -> Arc<dyn Scheduler> {
    Arc::new(crate::scheduler::BrowserScheduler::new())
}

// Outside the browser nothing drives timers
#[cfg(not(target_arch = "wasm32"))]
fn default_scheduler() -> Arc<dyn Scheduler> {
    leptos::logging::warn!(
        "[ShinyProvider] No scheduler given; debounced sends and rebinds will not run \
         until the ManualScheduler is advanced. Pass `scheduler` outside the browser."
    );
    Arc::new(crate::scheduler::ManualScheduler::new())
}
