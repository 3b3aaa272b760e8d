//! # Shiny Leptos
//!
//! Leptos hooks and components that bind component state to a Shiny server.
//!
//! Components read and write Shiny inputs, receive rendered outputs and
//! handle custom messages as ordinary Leptos signals, without writing any
//! Shiny binding code by hand.
//!
//! ## Features
//!
//! - **Shared Inputs**: Every component using the same input name sees the same value
//! - **Debounced Sends**: Local updates are immediate, server sends are debounced per input
//! - **Output Fan-out**: One server output can drive any number of components
//! - **Custom Messages**: Typed handlers keyed by message type, multiplexed over one channel
//! - **Testable**: A recording host and a manual clock drive everything without a browser
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leptos::prelude::*;
//! use shiny_leptos::{BrowserHost, ShinyProvider, use_shiny_input, use_shiny_output};
//!
//! #[component]
//! fn App() -> impl IntoView {
//!     view! {
//!         <ShinyProvider host=Arc::new(BrowserHost::new())>
//!             <Controls/>
//!         </ShinyProvider>
//!     }
//! }
//!
//! #[component]
//! fn Controls() -> impl IntoView {
//!     let (bins, set_bins) = use_shiny_input("bins", 30);
//!     let (summary, recalculating) = use_shiny_output::<String>("summary", None);
//!
//!     view! {
//!         <input
//!             type="range"
//!             prop:value=move || bins.get()
//!             on:input=move |ev| set_bins(event_target_value(&ev).parse().unwrap_or(30))
//!         />
//!         <pre class:recalculating=recalculating>
//!             {move || summary.get().unwrap_or_default()}
//!         </pre>
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`ShinyHost`]: the seam to the Shiny runtime ([`BrowserHost`] on wasm32,
//!   [`testing::RecordingHost`] in tests)
//! - [`ReactiveRegistry`]: shared input and output state, keyed by name
//! - [`MessageDispatcher`]: routes custom messages to handlers by type
//! - [`ShinySession`]: owns the above for one [`ShinyProvider`]

use std::sync::{Mutex, MutexGuard, PoisonError};

// Module declarations
mod binding;
mod components;
mod config;
mod context;
mod debounce;
mod error;
mod hooks;
mod host;
mod messages;
mod provider;
mod registry;
mod scheduler;
mod session;

#[cfg(target_arch = "wasm32")]
mod browser;

pub mod testing;

// Re-exports
pub use binding::{OutputBinding, RegistryOutputBinding};
pub use components::ImageOutput;
pub use config::{ShinyConfig, ShinyConfigBuilder};
pub use context::ShinyContext;
pub use debounce::Debouncer;
pub use error::ShinyError;
pub use host::{CustomMessageHandler, Scope, ShinyHost};
pub use messages::{HandlerId, MessageDispatcher, MessageHandler};
pub use provider::ShinyProvider;
pub use registry::{BusyCallback, InputOptions, ReactiveRegistry, SubscriberId, ValueCallback};
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerHandle};
pub use session::ShinySession;

pub use hooks::{
    attach_input, attach_message_handler, attach_output, input_setter, use_shiny_context,
    use_shiny_initialized, use_shiny_input, use_shiny_input_with_options,
    use_shiny_message_handler, use_shiny_output, use_shiny_session,
};

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserHost;
#[cfg(target_arch = "wasm32")]
pub use scheduler::BrowserScheduler;

// Re-export wire types from shiny_leptos_common for convenience
pub use shiny_leptos_common::{
    CustomMessage, EventPriority, ImageData, OutputError, SetInputOptions,
};

/// Lock a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
