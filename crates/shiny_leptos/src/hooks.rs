use std::sync::{Arc, Mutex};

use leptos::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::ShinyContext;
use crate::error::ShinyError;
use crate::lock;
use crate::messages::HandlerId;
use crate::registry::{InputOptions, SubscriberId};
use crate::session::ShinySession;

/// Hook to access the Shiny context.
///
/// # Panics
///
/// Panics if called outside of a `ShinyProvider` context.
pub fn use_shiny_context() -> ShinyContext {
    expect_context::<ShinyContext>()
}

/// Hook to access the session behind the nearest `ShinyProvider`.
///
/// # Panics
///
/// Panics if called outside of a `ShinyProvider` context.
pub fn use_shiny_session() -> Arc<ShinySession> {
    use_shiny_context().session
}

/// Hook that tracks whether the host has finished initializing.
///
/// The signal flips from `false` to `true` exactly once.
///
/// # Panics
///
/// Panics if called outside of a `ShinyProvider` context.
pub fn use_shiny_initialized() -> Signal<bool> {
    use_shiny_context().initialized
}

/// Hook to bind a piece of component state to a Shiny input.
///
/// Works like `signal(default)`: it returns the current value and a setter.
/// Once the host is initialized the setter pushes the value to every
/// component bound to the same input immediately, and to the server after
/// the input's debounce window (100 ms unless configured otherwise). Before
/// initialization the setter does nothing.
///
/// Every component calling this hook with the same name shares one input.
/// The first one to register sends its current value as the input's first
/// value; later ones start from the input's current value.
///
/// # Panics
///
/// Panics if called outside of a `ShinyProvider` context.
///
/// # Example
///
/// ```rust,ignore
/// use leptos::prelude::*;
/// use shiny_leptos::use_shiny_input;
///
/// #[component]
/// fn Counter() -> impl IntoView {
///     let (count, set_count) = use_shiny_input("count", 0);
///
///     view! {
///         <button on:click=move |_| set_count(count.get() + 1)>
///             "Clicked " {count} " times"
///         </button>
///     }
/// }
/// ```
pub fn use_shiny_input<T>(
    name: impl Into<String>,
    default: T,
) -> (ReadSignal<T>, impl Fn(T) + Clone + Send + Sync + 'static)
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    use_shiny_input_with_options(name, default, InputOptions::default())
}

/// [`use_shiny_input`] with a debounce window and priority.
///
/// Both options are fixed by the first component to register the input.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use leptos::prelude::*;
/// use shiny_leptos::{EventPriority, InputOptions, use_shiny_input_with_options};
///
/// #[component]
/// fn Trigger() -> impl IntoView {
///     // Every click reaches the server, even though the payload never changes
///     let (_, click) = use_shiny_input_with_options(
///         "button_click",
///         serde_json::json!({}),
///         InputOptions::default()
///             .priority(EventPriority::Event)
///             .debounce(Duration::ZERO),
///     );
///
///     view! { <button on:click=move |_| click(serde_json::json!({}))>"Go"</button> }
/// }
/// ```
pub fn use_shiny_input_with_options<T>(
    name: impl Into<String>,
    default: T,
    options: InputOptions,
) -> (ReadSignal<T>, impl Fn(T) + Clone + Send + Sync + 'static)
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let ctx = use_shiny_context();
    let name = name.into();
    let value = RwSignal::new(default);
    let subscription: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));

    {
        let session = ctx.session.clone();
        let name = name.clone();
        let subscription = subscription.clone();
        let initialized = ctx.initialized;

        Effect::new(move |_| {
            if !initialized.get() || lock(&subscription).is_some() {
                return;
            }
            // Failures are logged where they happen
            *lock(&subscription) = attach_input(&session, &name, value, options).ok();
        });
    }

    {
        let session = ctx.session.clone();
        let name = name.clone();
        on_cleanup(move || {
            if let Some(id) = lock(&subscription).take() {
                session.registry().unregister_input(&name, id);
            }
        });
    }

    (value.read_only(), input_setter(ctx.session, name))
}

/// Hook to receive a Shiny output.
///
/// Returns the latest value the server rendered for output `name` (or
/// `default` until the first render) and whether the server is currently
/// recalculating it.
///
/// # Panics
///
/// Panics if called outside of a `ShinyProvider` context.
///
/// # Example
///
/// ```rust,ignore
/// use leptos::prelude::*;
/// use shiny_leptos::use_shiny_output;
///
/// #[component]
/// fn Summary() -> impl IntoView {
///     let (text, recalculating) = use_shiny_output::<String>("summary", None);
///
///     view! {
///         <p class:recalculating=recalculating>
///             {move || text.get().unwrap_or_default()}
///         </p>
///     }
/// }
/// ```
pub fn use_shiny_output<T>(
    name: impl Into<String>,
    default: Option<T>,
) -> (ReadSignal<Option<T>>, ReadSignal<bool>)
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let ctx = use_shiny_context();
    let name = name.into();
    let value = RwSignal::new(default);
    let recalculating = RwSignal::new(false);
    let subscription: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));

    {
        let session = ctx.session.clone();
        let name = name.clone();
        let subscription = subscription.clone();
        let initialized = ctx.initialized;

        Effect::new(move |_| {
            if !initialized.get() || lock(&subscription).is_some() {
                return;
            }
            *lock(&subscription) = attach_output(&session, &name, value, recalculating).ok();
        });
    }

    let session = ctx.session;
    on_cleanup(move || {
        if let Some(id) = lock(&subscription).take() {
            session.registry().unregister_output(&name, id);
        }
    });

    (value.read_only(), recalculating.read_only())
}

/// Hook to handle custom messages of one type sent by the server.
///
/// `handler` receives the message's `data` decoded as `T`. The handler is
/// registered once the host is initialized, re-registered when
/// `message_type` changes, and removed when the component unmounts.
///
/// # Panics
///
/// Panics if called outside of a `ShinyProvider` context.
///
/// # Example
///
/// ```rust,ignore
/// use leptos::prelude::*;
/// use serde::Deserialize;
/// use shiny_leptos::use_shiny_message_handler;
///
/// #[derive(Deserialize)]
/// struct Toast {
///     text: String,
/// }
///
/// #[component]
/// fn Toasts() -> impl IntoView {
///     let (latest, set_latest) = signal(String::new());
///     use_shiny_message_handler("toast", move |toast: Toast| set_latest.set(toast.text));
///
///     view! { <div class="toast">{latest}</div> }
/// }
/// ```
pub fn use_shiny_message_handler<T, F>(message_type: impl Into<Signal<String>>, handler: F)
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let ctx = use_shiny_context();
    let message_type = message_type.into();
    let handler = Arc::new(handler);
    let registration: Arc<Mutex<Option<(String, HandlerId)>>> = Arc::new(Mutex::new(None));

    {
        let session = ctx.session.clone();
        let registration = registration.clone();
        let initialized = ctx.initialized;

        Effect::new(move |_| {
            let current_type = message_type.get();
            if !initialized.get() {
                return;
            }

            let mut registered = lock(&registration);
            if matches!(registered.as_ref(), Some((ty, _)) if *ty == current_type) {
                return;
            }
            if let Some((old_type, id)) = registered.take() {
                session.messages().remove_handler(&old_type, id);
            }

            let handler = handler.clone();
            let id = attach_message_handler(&session, &current_type, move |data: T| handler(data));
            *registered = Some((current_type, id));
        });
    }

    let session = ctx.session;
    on_cleanup(move || {
        if let Some((message_type, id)) = lock(&registration).take() {
            session.messages().remove_handler(&message_type, id);
        }
    });
}

/// Subscribe `value` to input `name` and seed the input.
///
/// The subscriber that creates the input sends its current value as the
/// input's first value. Any later subscriber adopts the input's last value
/// instead.
///
/// # Errors
///
/// [`ShinyError::EmptyName`] if `name` is empty, and
/// [`ShinyError::Serialization`] if the input would be created from a value
/// that does not serialize to JSON. Nothing is registered in either case.
pub fn attach_input<T>(
    session: &ShinySession,
    name: &str,
    value: RwSignal<T>,
    options: InputOptions,
) -> Result<SubscriberId, ShinyError>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let registry = session.registry();
    let creating = !registry.has_input(name);

    let initial = if creating {
        value
            .try_with_untracked(|v| serde_json::to_value(v))
            .transpose()
            .map_err(|e| {
                let err = ShinyError::serialization(name, e);
                leptos::logging::error!("[use_shiny_input] {}", err);
                err
            })?
    } else {
        None
    };

    let input_name = name.to_string();
    let id = registry.register_input(
        name,
        Arc::new(move |raw: &Value| match serde_json::from_value::<T>(raw.clone()) {
            Ok(v) => {
                value.try_set(v);
            }
            Err(e) => {
                leptos::logging::warn!(
                    "[use_shiny_input] Ignoring value for '{}': {}",
                    input_name,
                    e
                );
            }
        }),
        options,
    )?;

    if let Some(initial) = initial {
        registry.set_input_value(name, initial, None)?;
    } else if !creating {
        if let Some(current) = registry.input_value(name) {
            if let Ok(v) = serde_json::from_value::<T>(current) {
                value.try_set(v);
            }
        }
    }

    Ok(id)
}

/// Setter that forwards values to input `name` once the session is ready.
pub fn input_setter<T>(
    session: Arc<ShinySession>,
    name: String,
) -> impl Fn(T) + Clone + Send + Sync + 'static
where
    T: Serialize,
{
    move |new_value: T| {
        if !session.is_initialized() {
            return;
        }
        match serde_json::to_value(&new_value) {
            Ok(json) => {
                // Unknown inputs are logged by the registry
                let _ = session.registry().set_input_value(&name, json, None);
            }
            Err(e) => {
                let err = ShinyError::serialization(&name, e);
                leptos::logging::error!("[use_shiny_input] {}", err);
            }
        }
    }
}

/// Subscribe `value` and `recalculating` to output `name`.
///
/// # Errors
///
/// [`ShinyError::EmptyName`] if `name` is empty.
pub fn attach_output<T>(
    session: &ShinySession,
    name: &str,
    value: RwSignal<Option<T>>,
    recalculating: RwSignal<bool>,
) -> Result<SubscriberId, ShinyError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let output_name = name.to_string();
    session.registry().register_output(
        name,
        Arc::new(move |raw: &Value| match serde_json::from_value::<T>(raw.clone()) {
            Ok(v) => {
                value.try_set(Some(v));
            }
            Err(e) => {
                leptos::logging::warn!(
                    "[use_shiny_output] Ignoring value for '{}': {}",
                    output_name,
                    e
                );
            }
        }),
        Arc::new(move |busy: bool| {
            recalculating.try_set(busy);
        }),
    )
}

/// Register `handler` for messages of `message_type`, decoding `data` as `T`.
pub fn attach_message_handler<T, F>(
    session: &ShinySession,
    message_type: &str,
    handler: F,
) -> HandlerId
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let type_name = message_type.to_string();
    session.messages().add_handler(
        message_type,
        Arc::new(move |data: &Value| match serde_json::from_value::<T>(data.clone()) {
            Ok(decoded) => handler(decoded),
            Err(e) => {
                leptos::logging::warn!(
                    "[use_shiny_message_handler] Ignoring '{}' message: {}",
                    type_name,
                    e
                );
            }
        }),
    )
}
