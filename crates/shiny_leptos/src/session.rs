use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::binding::RegistryOutputBinding;
use crate::config::ShinyConfig;
use crate::host::ShinyHost;
use crate::lock;
use crate::messages::MessageDispatcher;
use crate::registry::ReactiveRegistry;
use crate::scheduler::Scheduler;

#[derive(Default)]
struct Lifecycle {
    initialized: bool,
    closed: bool,
    ready_callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

/// Everything one Shiny session needs on the client.
///
/// Owns the registry, the message dispatcher and the output binding for a
/// single host session. Construct it once per session, [`start`](Self::start)
/// it, and [`teardown`](Self::teardown) it when the session ends.
/// [`ShinyProvider`](crate::ShinyProvider) does all three.
pub struct ShinySession {
    host: Arc<dyn ShinyHost>,
    scheduler: Arc<dyn Scheduler>,
    registry: Arc<ReactiveRegistry>,
    messages: Arc<MessageDispatcher>,
    binding: Arc<RegistryOutputBinding>,
    started: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl ShinySession {
    pub fn new(
        host: Arc<dyn ShinyHost>,
        scheduler: Arc<dyn Scheduler>,
        config: ShinyConfig,
    ) -> Arc<Self> {
        let messages = Arc::new(MessageDispatcher::new(
            host.clone(),
            config.message_channel(),
        ));
        let registry = Arc::new(ReactiveRegistry::new(
            host.clone(),
            scheduler.clone(),
            config,
        ));
        let binding = Arc::new(RegistryOutputBinding::new(registry.clone()));

        Arc::new(Self {
            host,
            scheduler,
            registry,
            messages,
            binding,
            started: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Hook the session into the host. Idempotent.
    ///
    /// Registers the output binding, the message channel and the server
    /// "set inputs" channel, then waits for the host to report readiness.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let config = self.registry.config();
        self.host
            .register_output_binding(self.binding.clone(), config.binding_name());
        self.messages.init();

        let registry = Arc::downgrade(&self.registry);
        self.host.add_custom_message_handler(
            config.set_inputs_channel(),
            Arc::new(move |raw: Value| {
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                match raw {
                    Value::Object(values) => {
                        registry.set_inputs_from_server(&values);
                    }
                    other => {
                        leptos::logging::warn!(
                            "[ShinySession] Expected an object of input values, got {}",
                            other
                        );
                    }
                }
            }),
        );

        let session = Arc::downgrade(self);
        self.host.on_initialized(Box::new(move || {
            if let Some(session) = session.upgrade() {
                session.mark_initialized();
            }
        }));
    }

    fn mark_initialized(&self) {
        let callbacks = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.closed || lifecycle.initialized {
                return;
            }
            lifecycle.initialized = true;
            std::mem::take(&mut lifecycle.ready_callbacks)
        };

        #[cfg(target_arch = "wasm32")]
        leptos::logging::log!("[ShinySession] Host initialized");

        for callback in callbacks {
            callback();
        }
    }

    /// Whether the host is ready and the session has not been torn down.
    pub fn is_initialized(&self) -> bool {
        let lifecycle = lock(&self.lifecycle);
        lifecycle.initialized && !lifecycle.closed
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.lifecycle).closed
    }

    /// Run `callback` once the host is ready; immediately if it already is.
    /// Callbacks still queued at teardown never run.
    pub fn on_ready(&self, callback: Box<dyn FnOnce() + Send>) {
        let run_now = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.closed {
                return;
            }
            if lifecycle.initialized {
                Some(callback)
            } else {
                lifecycle.ready_callbacks.push(callback);
                None
            }
        };
        if let Some(callback) = run_now {
            callback();
        }
    }

    /// End the session: drop queued ready callbacks and pending input sends.
    pub fn teardown(&self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
            lifecycle.ready_callbacks.clear();
        }
        self.registry.cancel_pending();

        #[cfg(target_arch = "wasm32")]
        leptos::logging::log!("[ShinySession] Torn down");
    }

    pub fn host(&self) -> &Arc<dyn ShinyHost> {
        &self.host
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<ReactiveRegistry> {
        &self.registry
    }

    pub fn messages(&self) -> &Arc<MessageDispatcher> {
        &self.messages
    }

    pub fn config(&self) -> &ShinyConfig {
        self.registry.config()
    }
}
