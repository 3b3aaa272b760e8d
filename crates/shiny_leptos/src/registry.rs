use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use shiny_leptos_common::{EventPriority, SetInputOptions};

use crate::config::ShinyConfig;
use crate::debounce::Debouncer;
use crate::error::ShinyError;
use crate::host::ShinyHost;
use crate::lock;
use crate::scheduler::Scheduler;

/// Receives every value set for an input or rendered for an output.
pub type ValueCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Receives the recalculating flag of an output.
pub type BusyCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Identifies one subscription so it can be removed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Per-registration input settings.
///
/// Both settings are fixed by the first registration of a name. Later
/// registrations asking for something else are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputOptions {
    pub priority: Option<EventPriority>,
    pub debounce: Option<Duration>,
}

impl InputOptions {
    pub fn priority(mut self, priority: EventPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn debounce(mut self, wait: Duration) -> Self {
        self.debounce = Some(wait);
        self
    }
}

struct InputEntry {
    id: String,
    subscribers: Vec<(SubscriberId, ValueCallback)>,
    options: SetInputOptions,
    send_debounced: Debouncer<(Value, SetInputOptions)>,
    last_value: Option<Value>,
}

struct OutputEntry {
    id: String,
    value_subscribers: Vec<(SubscriberId, ValueCallback)>,
    busy_subscribers: Vec<(SubscriberId, BusyCallback)>,
}

/// Tracks which inputs and outputs are mounted and keeps them in sync with
/// the host.
///
/// Setting an input updates every local subscriber immediately and sends the
/// value to the server through a per-input debouncer, so components sharing a
/// name agree at once while server traffic stays throttled. Outputs get a
/// hidden DOM anchor on first registration; the host's binding scanner finds
/// it and from then on drives the output through
/// [`RegistryOutputBinding`](crate::RegistryOutputBinding).
///
/// Entries are never removed. Subscribers can be, through the ids returned
/// at registration.
pub struct ReactiveRegistry {
    host: Arc<dyn ShinyHost>,
    scheduler: Arc<dyn Scheduler>,
    config: ShinyConfig,
    inputs: Mutex<HashMap<String, InputEntry>>,
    outputs: Mutex<HashMap<String, OutputEntry>>,
    /// Set while a rebind pass is waiting for its frame
    bind_all_scheduled: Arc<AtomicBool>,
    next_subscriber_id: AtomicU64,
}

impl ReactiveRegistry {
    pub fn new(
        host: Arc<dyn ShinyHost>,
        scheduler: Arc<dyn Scheduler>,
        config: ShinyConfig,
    ) -> Self {
        Self {
            host,
            scheduler,
            config,
            inputs: Mutex::new(HashMap::new()),
            outputs: Mutex::new(HashMap::new()),
            bind_all_scheduled: Arc::new(AtomicBool::new(false)),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    pub fn host(&self) -> &Arc<dyn ShinyHost> {
        &self.host
    }

    pub fn config(&self) -> &ShinyConfig {
        &self.config
    }

    fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe `callback` to input `name`, creating the entry on first use.
    ///
    /// The debounce window and priority in `options` only apply when this
    /// call creates the entry.
    pub fn register_input(
        &self,
        name: &str,
        callback: ValueCallback,
        options: InputOptions,
    ) -> Result<SubscriberId, ShinyError> {
        if name.is_empty() {
            leptos::logging::error!(
                "[ReactiveRegistry] Refusing to register an input with an empty name"
            );
            return Err(ShinyError::EmptyName);
        }

        let id = self.next_id();
        let mut inputs = lock(&self.inputs);
        let entry = inputs.entry(name.to_string()).or_insert_with(|| {
            let wait = options.debounce.unwrap_or(self.config.default_debounce());
            let host = self.host.clone();
            let input_id = name.to_string();

            #[cfg(target_arch = "wasm32")]
            leptos::logging::log!(
                "[ReactiveRegistry] Creating input '{}' (debounce {:?})",
                input_id,
                wait
            );

            InputEntry {
                id: name.to_string(),
                subscribers: Vec::new(),
                options: SetInputOptions {
                    priority: options.priority,
                },
                send_debounced: Debouncer::new(
                    self.scheduler.clone(),
                    wait,
                    move |(value, opts): (Value, SetInputOptions)| {
                        host.set_input_value(&input_id, value, opts);
                    },
                ),
                last_value: None,
            }
        });
        entry.subscribers.push((id, callback));
        Ok(id)
    }

    /// Remove one input subscriber. The entry itself stays.
    pub fn unregister_input(&self, name: &str, id: SubscriberId) -> bool {
        let mut inputs = lock(&self.inputs);
        match inputs.get_mut(name) {
            Some(entry) => {
                let before = entry.subscribers.len();
                entry.subscribers.retain(|(sub, _)| *sub != id);
                entry.subscribers.len() != before
            }
            None => false,
        }
    }

    /// Set input `name` to `value`.
    ///
    /// Every subscriber sees the value before this returns. The server sees
    /// it once the input's debounce window passes without another set. A
    /// priority in `options` replaces the registered one for this value.
    pub fn set_input_value(
        &self,
        name: &str,
        value: Value,
        options: Option<SetInputOptions>,
    ) -> Result<(), ShinyError> {
        let (subscribers, sender, send_options) = {
            let mut inputs = lock(&self.inputs);
            let Some(entry) = inputs.get_mut(name) else {
                leptos::logging::error!("[ReactiveRegistry] Input {} not found", name);
                return Err(ShinyError::UnknownInput {
                    name: name.to_string(),
                });
            };
            entry.last_value = Some(value.clone());
            (
                snapshot(&entry.subscribers),
                entry.send_debounced.clone(),
                entry.options.overridden_by(options),
            )
        };

        sender.call((value.clone(), send_options));
        for callback in subscribers {
            callback(&value);
        }
        Ok(())
    }

    /// Apply values the server pushed for client inputs.
    ///
    /// Known inputs are updated locally and fanned out to their subscribers
    /// without echoing the value back to the server. Returns how many inputs
    /// were updated.
    pub fn set_inputs_from_server(&self, values: &Map<String, Value>) -> usize {
        let mut applied = 0;
        for (name, value) in values {
            let subscribers = {
                let mut inputs = lock(&self.inputs);
                match inputs.get_mut(name) {
                    Some(entry) => {
                        entry.last_value = Some(value.clone());
                        snapshot(&entry.subscribers)
                    }
                    None => {
                        #[cfg(target_arch = "wasm32")]
                        leptos::logging::log!(
                            "[ReactiveRegistry] Server set unknown input '{}', skipping",
                            name
                        );
                        continue;
                    }
                }
            };
            for callback in subscribers {
                callback(value);
            }
            applied += 1;
        }
        applied
    }

    /// Last value set for input `name`, locally or by the server.
    pub fn input_value(&self, name: &str) -> Option<Value> {
        lock(&self.inputs).get(name).and_then(|e| e.last_value.clone())
    }

    /// Debounce window fixed when input `name` was created.
    pub fn input_debounce(&self, name: &str) -> Option<Duration> {
        lock(&self.inputs).get(name).map(|e| e.send_debounced.wait())
    }

    pub fn has_input(&self, name: &str) -> bool {
        lock(&self.inputs).contains_key(name)
    }

    pub fn input_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inputs).values().map(|e| e.id.clone()).collect();
        names.sort();
        names
    }

    pub fn input_subscriber_count(&self, name: &str) -> usize {
        lock(&self.inputs).get(name).map_or(0, |e| e.subscribers.len())
    }

    /// Subscribe to output `name`, creating the entry and its anchor on
    /// first use.
    pub fn register_output(
        &self,
        name: &str,
        on_value: ValueCallback,
        on_busy: BusyCallback,
    ) -> Result<SubscriberId, ShinyError> {
        if name.is_empty() {
            leptos::logging::error!(
                "[ReactiveRegistry] Refusing to register an output with an empty name"
            );
            return Err(ShinyError::EmptyName);
        }

        let id = self.next_id();
        let created = {
            let mut outputs = lock(&self.outputs);
            let created = !outputs.contains_key(name);
            let entry = outputs.entry(name.to_string()).or_insert_with(|| OutputEntry {
                id: name.to_string(),
                value_subscribers: Vec::new(),
                busy_subscribers: Vec::new(),
            });
            entry.value_subscribers.push((id, on_value));
            entry.busy_subscribers.push((id, on_busy));
            created
        };

        if created {
            #[cfg(target_arch = "wasm32")]
            leptos::logging::log!("[ReactiveRegistry] Creating output anchor '{}'", name);

            self.host.create_anchor(name, self.config.output_class());
            self.schedule_bind_all();
        }
        Ok(id)
    }

    /// Remove one output subscriber. The entry and its anchor stay.
    pub fn unregister_output(&self, name: &str, id: SubscriberId) -> bool {
        let mut outputs = lock(&self.outputs);
        match outputs.get_mut(name) {
            Some(entry) => {
                let before = entry.value_subscribers.len();
                entry.value_subscribers.retain(|(sub, _)| *sub != id);
                entry.busy_subscribers.retain(|(sub, _)| *sub != id);
                entry.value_subscribers.len() != before
            }
            None => false,
        }
    }

    /// Fan a rendered value out to every subscriber of output `name`.
    pub fn render_output(&self, name: &str, value: &Value) -> Result<(), ShinyError> {
        let subscribers = {
            let outputs = lock(&self.outputs);
            let Some(entry) = outputs.get(name) else {
                leptos::logging::error!("[ReactiveRegistry] Output {} not found", name);
                return Err(ShinyError::UnknownOutput {
                    name: name.to_string(),
                });
            };
            snapshot(&entry.value_subscribers)
        };
        for callback in subscribers {
            callback(value);
        }
        Ok(())
    }

    /// Fan the recalculating flag out to every subscriber of output `name`.
    pub fn set_output_busy(&self, name: &str, busy: bool) -> Result<(), ShinyError> {
        let subscribers = {
            let outputs = lock(&self.outputs);
            let Some(entry) = outputs.get(name) else {
                leptos::logging::error!("[ReactiveRegistry] Output {} not found", name);
                return Err(ShinyError::UnknownOutput {
                    name: name.to_string(),
                });
            };
            snapshot(&entry.busy_subscribers)
        };
        for callback in subscribers {
            callback(busy);
        }
        Ok(())
    }

    pub fn has_output(&self, name: &str) -> bool {
        lock(&self.outputs).contains_key(name)
    }

    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.outputs).values().map(|e| e.id.clone()).collect();
        names.sort();
        names
    }

    pub fn output_subscriber_count(&self, name: &str) -> usize {
        lock(&self.outputs).get(name).map_or(0, |e| e.value_subscribers.len())
    }

    /// Drop every pending debounced send.
    pub fn cancel_pending(&self) {
        for entry in lock(&self.inputs).values() {
            entry.send_debounced.cancel();
        }
    }

    /// Queue one unbind/bind pass for the next frame.
    ///
    /// Outputs created in the same update batch share a single pass, and a
    /// pass is never started while another is waiting.
    fn schedule_bind_all(&self) {
        if self.bind_all_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let host = self.host.clone();
        let scheduled = self.bind_all_scheduled.clone();
        self.scheduler.request_frame(Box::new(move || {
            host.unbind_all();
            host.bind_all();
            scheduled.store(false, Ordering::Release);
        }));
    }
}

fn snapshot<C: Clone>(subscribers: &[(SubscriberId, C)]) -> Vec<C> {
    subscribers.iter().map(|(_, callback)| callback.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::testing::RecordingHost;
    use serde_json::json;

    fn setup() -> (Arc<RecordingHost>, Arc<ManualScheduler>, Arc<ReactiveRegistry>) {
        let host = Arc::new(RecordingHost::new());
        let clock = Arc::new(ManualScheduler::new());
        let registry = Arc::new(ReactiveRegistry::new(
            host.clone(),
            clock.clone(),
            ShinyConfig::default(),
        ));
        (host, clock, registry)
    }

    fn recording_callback() -> (ValueCallback, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let callback: ValueCallback =
            Arc::new(move |v: &Value| seen_clone.lock().unwrap().push(v.clone()));
        (callback, seen)
    }

    #[test]
    fn test_fan_out_reaches_every_subscriber_in_order() {
        let (_host, _clock, registry) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            let callback: ValueCallback =
                Arc::new(move |v: &Value| order.lock().unwrap().push((i, v.clone())));
            registry
                .register_input("x", callback, InputOptions::default())
                .unwrap();
        }

        registry.set_input_value("x", json!(42), None).unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec![(0, json!(42)), (1, json!(42)), (2, json!(42))]
        );
    }

    #[test]
    fn test_burst_sends_only_last_value() {
        let (host, clock, registry) = setup();
        let (callback, seen) = recording_callback();
        registry.register_input("x", callback, InputOptions::default()).unwrap();

        for v in 1..=5 {
            registry.set_input_value("x", json!(v), None).unwrap();
            clock.advance_by(Duration::from_millis(20));
        }

        // Local subscribers saw every value immediately
        assert_eq!(seen.lock().unwrap().len(), 5);
        assert!(host.sent_inputs().is_empty());

        clock.advance_by(Duration::from_millis(100));
        let sent = host.sent_inputs();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "x");
        assert_eq!(sent[0].value, json!(5));
        assert_eq!(sent[0].options, SetInputOptions::default());
    }

    #[test]
    fn test_first_registration_fixes_debounce_window() {
        let (host, clock, registry) = setup();
        let (first, _) = recording_callback();
        let (second, _) = recording_callback();

        registry
            .register_input(
                "x",
                first,
                InputOptions::default().debounce(Duration::from_millis(300)),
            )
            .unwrap();
        registry
            .register_input(
                "x",
                second,
                InputOptions::default().debounce(Duration::from_millis(10)),
            )
            .unwrap();
        assert_eq!(registry.input_debounce("x"), Some(Duration::from_millis(300)));

        registry.set_input_value("x", json!("a"), None).unwrap();
        clock.advance_by(Duration::from_millis(299));
        assert!(host.sent_inputs().is_empty());
        clock.advance_by(Duration::from_millis(1));
        assert_eq!(host.sent_inputs().len(), 1);
    }

    #[test]
    fn test_first_registration_fixes_priority() {
        let (host, clock, registry) = setup();
        let (first, _) = recording_callback();
        let (second, _) = recording_callback();

        registry
            .register_input(
                "x",
                first,
                InputOptions::default().priority(EventPriority::Deferred),
            )
            .unwrap();
        registry
            .register_input(
                "x",
                second,
                InputOptions::default().priority(EventPriority::Event),
            )
            .unwrap();

        for v in 1..=2 {
            registry.set_input_value("x", json!(v), None).unwrap();
            clock.advance_by(Duration::from_millis(100));
        }

        let sent = host.sent_to("x");
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .all(|s| s.options.priority == Some(EventPriority::Deferred)));
    }

    #[test]
    fn test_unknown_input_is_reported_not_sent() {
        let (host, clock, registry) = setup();

        let err = registry.set_input_value("missing", json!(1), None).unwrap_err();
        assert_eq!(err, ShinyError::UnknownInput { name: "missing".into() });

        clock.advance_by(Duration::from_secs(1));
        assert!(host.sent_inputs().is_empty());
        assert!(!registry.has_input("missing"));
    }

    #[test]
    fn test_empty_names_are_rejected() {
        let (_host, _clock, registry) = setup();
        let (callback, _) = recording_callback();

        assert_eq!(
            registry.register_input("", callback.clone(), InputOptions::default()),
            Err(ShinyError::EmptyName)
        );
        assert_eq!(
            registry.register_output("", callback, Arc::new(|_: bool| {})),
            Err(ShinyError::EmptyName)
        );
    }

    #[test]
    fn test_event_priority_resends_identical_values() {
        let (host, clock, registry) = setup();
        let (callback, _) = recording_callback();
        registry
            .register_input(
                "click",
                callback,
                InputOptions::default().priority(EventPriority::Event),
            )
            .unwrap();

        for _ in 0..2 {
            registry.set_input_value("click", json!({}), None).unwrap();
            clock.advance_by(Duration::from_millis(100));
        }

        let sent = host.sent_to("click");
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|s| s.value == json!({})
            && s.options.priority == Some(EventPriority::Event)));
    }

    #[test]
    fn test_call_priority_overrides_registered_priority() {
        let (host, clock, registry) = setup();
        let (callback, _) = recording_callback();
        registry
            .register_input(
                "x",
                callback,
                InputOptions::default().priority(EventPriority::Deferred),
            )
            .unwrap();

        registry
            .set_input_value(
                "x",
                json!(1),
                Some(SetInputOptions::with_priority(EventPriority::Event)),
            )
            .unwrap();
        clock.advance_by(Duration::from_millis(100));
        registry.set_input_value("x", json!(2), None).unwrap();
        clock.advance_by(Duration::from_millis(100));

        let sent = host.sent_to("x");
        assert_eq!(sent[0].options.priority, Some(EventPriority::Event));
        assert_eq!(sent[1].options.priority, Some(EventPriority::Deferred));
    }

    #[test]
    fn test_output_anchor_created_once() {
        let (host, _clock, registry) = setup();

        registry.register_output("y", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();
        registry.register_output("y", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();

        assert_eq!(host.anchor_count("y"), 1);
        assert_eq!(host.anchors()[0].class, "shiny-leptos-output");
        assert_eq!(registry.output_subscriber_count("y"), 2);
    }

    #[test]
    fn test_rebind_is_coalesced_per_frame() {
        let (host, clock, registry) = setup();

        registry.register_output("a", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();
        registry.register_output("b", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();
        registry.register_output("c", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();
        assert_eq!(clock.pending_frames(), 1);
        assert_eq!(host.bind_passes(), 0);

        clock.run_frame();
        assert_eq!(host.unbind_passes(), 1);
        assert_eq!(host.bind_passes(), 1);

        // A later batch gets its own pass
        registry.register_output("d", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();
        assert_eq!(clock.pending_frames(), 1);
        clock.run_frame();
        assert_eq!(host.bind_passes(), 2);

        // Existing outputs never trigger a pass
        registry.register_output("a", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {})).unwrap();
        assert_eq!(clock.pending_frames(), 0);
    }

    #[test]
    fn test_output_fan_out_and_progress() {
        let (_host, _clock, registry) = setup();
        let (on_value, values) = recording_callback();
        let busy = Arc::new(Mutex::new(Vec::new()));
        let busy_clone = busy.clone();
        registry
            .register_output(
                "y",
                on_value,
                Arc::new(move |b: bool| busy_clone.lock().unwrap().push(b)),
            )
            .unwrap();

        registry.set_output_busy("y", true).unwrap();
        registry.render_output("y", &json!({ "src": "a.png" })).unwrap();
        registry.set_output_busy("y", false).unwrap();

        assert_eq!(*busy.lock().unwrap(), vec![true, false]);
        assert_eq!(*values.lock().unwrap(), vec![json!({ "src": "a.png" })]);

        assert!(registry.render_output("nope", &json!(1)).is_err());
        assert!(registry.set_output_busy("nope", true).is_err());
    }

    #[test]
    fn test_unregister_keeps_entry() {
        let (_host, _clock, registry) = setup();
        let (first, first_seen) = recording_callback();
        let (second, second_seen) = recording_callback();

        let first_id = registry.register_input("x", first, InputOptions::default()).unwrap();
        registry.register_input("x", second, InputOptions::default()).unwrap();

        assert!(registry.unregister_input("x", first_id));
        assert!(!registry.unregister_input("x", first_id));
        registry.set_input_value("x", json!(1), None).unwrap();

        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(*second_seen.lock().unwrap(), vec![json!(1)]);
        assert!(registry.has_input("x"));

        let out_id = registry
            .register_output("y", Arc::new(|_: &Value| {}), Arc::new(|_: bool| {}))
            .unwrap();
        assert!(registry.unregister_output("y", out_id));
        assert_eq!(registry.output_subscriber_count("y"), 0);
        assert!(registry.has_output("y"));
    }

    #[test]
    fn test_server_set_inputs_does_not_echo() {
        let (host, clock, registry) = setup();
        let (callback, seen) = recording_callback();
        registry.register_input("x", callback, InputOptions::default()).unwrap();

        let mut values = Map::new();
        values.insert("x".into(), json!("from server"));
        values.insert("unknown".into(), json!(0));

        assert_eq!(registry.set_inputs_from_server(&values), 1);
        assert_eq!(*seen.lock().unwrap(), vec![json!("from server")]);
        assert_eq!(registry.input_value("x"), Some(json!("from server")));

        clock.advance_by(Duration::from_secs(1));
        assert!(host.sent_inputs().is_empty());
        assert!(!registry.has_input("unknown"));
    }

    #[test]
    fn test_subscriber_may_reenter_registry() {
        let (_host, _clock, registry) = setup();
        let registry_clone = registry.clone();
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();

        registry
            .register_input(
                "x",
                Arc::new(move |_: &Value| {
                    *observed_clone.lock().unwrap() = registry_clone.input_value("x");
                }),
                InputOptions::default(),
            )
            .unwrap();

        registry.set_input_value("x", json!(3), None).unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_cancel_pending_drops_debounced_sends() {
        let (host, clock, registry) = setup();
        let (callback, _) = recording_callback();
        registry.register_input("x", callback, InputOptions::default()).unwrap();

        registry.set_input_value("x", json!(1), None).unwrap();
        registry.cancel_pending();
        clock.advance_by(Duration::from_secs(1));

        assert!(host.sent_inputs().is_empty());
        assert_eq!(registry.input_names(), vec!["x".to_string()]);
    }
}
