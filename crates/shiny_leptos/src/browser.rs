//! `window.Shiny` as a [`ShinyHost`].

use std::sync::Arc;

use js_sys::{Array, Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use shiny_leptos_common::{OutputError, SetInputOptions};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, Element, HtmlCollection, HtmlElement, Node};

use crate::binding::OutputBinding;
use crate::host::{CustomMessageHandler, Scope, ShinyHost};

/// The Shiny runtime loaded in the current page.
///
/// Holds no JS state of its own; every call looks `window.Shiny` up again,
/// so the host is `Send + Sync` and can live in a Leptos context.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserHost;

impl BrowserHost {
    pub fn new() -> Self {
        Self
    }
}

fn shiny() -> Option<JsValue> {
    Reflect::get(&js_sys::global(), &JsValue::from_str("Shiny"))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn document() -> Option<Document> {
    web_sys::window().and_then(|w| w.document())
}

fn call_method(target: &JsValue, name: &str, args: &[&JsValue]) -> Result<JsValue, JsValue> {
    let method: Function = Reflect::get(target, &JsValue::from_str(name))?.dyn_into()?;
    let args: Array = args.iter().collect();
    method.apply(target, &args)
}

fn call_shiny(name: &str, args: &[&JsValue]) {
    let Some(shiny) = shiny() else {
        leptos::logging::error!(
            "[BrowserHost] window.Shiny is not available, cannot call {}",
            name
        );
        return;
    };
    if let Err(e) = call_method(&shiny, name, args) {
        leptos::logging::error!("[BrowserHost] Shiny.{} failed: {:?}", name, e);
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn from_js(value: JsValue) -> Result<Value, serde_wasm_bindgen::Error> {
    serde_wasm_bindgen::from_value(value)
}

/// Element id of a binding callback's `el` argument.
fn element_id(el: &JsValue) -> Option<String> {
    el.dyn_ref::<Element>().map(Element::id).filter(|id| !id.is_empty())
}

/// Root element of a `find` call's scope, unwrapping jQuery.
/// `None` means the whole document.
fn scope_root(scope: &JsValue) -> Option<Element> {
    let element = match Reflect::has(scope, &JsValue::from_str("jquery")) {
        Ok(true) => Reflect::get(scope, &JsValue::from_f64(0.0)).ok()?,
        _ => scope.clone(),
    };
    element.dyn_into::<Element>().ok()
}

/// Elements the binding finds below `scope`, excluding the scope itself.
fn find_elements(binding: &dyn OutputBinding, scope: &JsValue) -> Vec<Element> {
    let Some(document) = document() else {
        return Vec::new();
    };
    let root = scope_root(scope);

    // Roots without an id are searched through the whole document
    let ids = match root.as_ref().map(Element::id).filter(|id| !id.is_empty()) {
        Some(id) => binding.find(&Scope::Element(id)),
        None => binding.find(&Scope::Document),
    };

    ids.iter()
        .filter_map(|id| document.get_element_by_id(id))
        .filter(|el| match &root {
            Some(root) => {
                let node: &Node = el.as_ref();
                !root.is_same_node(Some(node)) && root.contains(Some(node))
            }
            None => true,
        })
        .collect()
}

/// Wrap elements in jQuery when the page has it, as the host expects.
fn wrap_jquery(elements: Array) -> JsValue {
    let jquery = Reflect::get(&js_sys::global(), &JsValue::from_str("jQuery"))
        .ok()
        .and_then(|jq| jq.dyn_into::<Function>().ok());
    match jquery {
        Some(jq) => jq.call1(&JsValue::NULL, &elements).unwrap_or_else(|_| elements.into()),
        None => elements.into(),
    }
}

fn collection_ids(collection: &HtmlCollection) -> Vec<String> {
    (0..collection.length())
        .filter_map(|i| collection.item(i))
        .map(|el| el.id())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Build the JS binding object: an instance of `Shiny.OutputBinding`'s
/// prototype whose methods forward to `binding`.
fn binding_object(shiny: &JsValue, binding: Arc<dyn OutputBinding>) -> Result<Object, JsValue> {
    let base = Reflect::get(shiny, &JsValue::from_str("OutputBinding"))?;
    let prototype = Reflect::get(&base, &JsValue::from_str("prototype"))?;
    let object = Object::create(prototype.unchecked_ref());

    let find = {
        let binding = binding.clone();
        Closure::<dyn Fn(JsValue) -> JsValue>::new(move |scope: JsValue| {
            let elements: Array = find_elements(&*binding, &scope).into_iter().collect();
            wrap_jquery(elements)
        })
    };

    let render_value = {
        let binding = binding.clone();
        Closure::<dyn Fn(JsValue, JsValue)>::new(move |el: JsValue, data: JsValue| {
            let Some(id) = element_id(&el) else {
                return;
            };
            match from_js(data) {
                Ok(value) => binding.render_value(&id, &value),
                Err(e) => {
                    leptos::logging::warn!("[BrowserHost] Undecodable value for {}: {}", id, e);
                }
            }
        })
    };

    let render_error = {
        let binding = binding.clone();
        Closure::<dyn Fn(JsValue, JsValue)>::new(move |el: JsValue, err: JsValue| {
            let Some(id) = element_id(&el) else {
                return;
            };
            let error = from_js(err)
                .ok()
                .and_then(|v| serde_json::from_value::<OutputError>(v).ok())
                .unwrap_or_else(|| OutputError {
                    message: "Unknown error".to_string(),
                    ..Default::default()
                });
            binding.render_error(&id, &error);
        })
    };

    let show_progress = Closure::<dyn Fn(JsValue, JsValue)>::new(move |el: JsValue, show: JsValue| {
        if let Some(id) = element_id(&el) {
            binding.show_progress(&id, show.as_bool().unwrap_or(false));
        }
    });

    // The closures live as long as the page
    Reflect::set(&object, &JsValue::from_str("find"), &find.into_js_value())?;
    Reflect::set(&object, &JsValue::from_str("renderValue"), &render_value.into_js_value())?;
    Reflect::set(&object, &JsValue::from_str("renderError"), &render_error.into_js_value())?;
    Reflect::set(&object, &JsValue::from_str("showProgress"), &show_progress.into_js_value())?;

    Ok(object)
}

impl ShinyHost for BrowserHost {
    fn on_initialized(&self, callback: Box<dyn FnOnce() + Send>) {
        let Some(shiny) = shiny() else {
            leptos::logging::error!(
                "[BrowserHost] window.Shiny is not available; never initializing"
            );
            return;
        };

        let promise = Reflect::get(&shiny, &JsValue::from_str("initializedPromise"))
            .ok()
            .and_then(|p| p.dyn_into::<Promise>().ok());
        match promise {
            Some(promise) => wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = JsFuture::from(promise).await {
                    leptos::logging::error!("[BrowserHost] Shiny failed to initialize: {:?}", e);
                    return;
                }
                callback();
            }),
            // Runtimes without the promise are ready once loaded
            None => callback(),
        }
    }

    fn set_input_value(&self, name: &str, value: Value, options: SetInputOptions) {
        let (value, options) = match (to_js(&value), to_js(&options)) {
            (Ok(value), Ok(options)) => (value, options),
            (Err(e), _) | (_, Err(e)) => {
                leptos::logging::error!("[BrowserHost] Cannot convert value for {}: {}", name, e);
                return;
            }
        };
        call_shiny("setInputValue", &[&JsValue::from_str(name), &value, &options]);
    }

    fn add_custom_message_handler(&self, channel: &str, handler: CustomMessageHandler) {
        let channel_name = channel.to_string();
        let callback = Closure::<dyn Fn(JsValue)>::new(move |msg: JsValue| match from_js(msg) {
            Ok(value) => handler(value),
            Err(e) => {
                leptos::logging::warn!(
                    "[BrowserHost] Undecodable message on {}: {}",
                    channel_name,
                    e
                );
            }
        });
        call_shiny(
            "addCustomMessageHandler",
            &[&JsValue::from_str(channel), &callback.into_js_value()],
        );
    }

    fn register_output_binding(&self, binding: Arc<dyn OutputBinding>, binding_name: &str) {
        let Some(shiny) = shiny() else {
            leptos::logging::error!(
                "[BrowserHost] window.Shiny is not available; binding not registered"
            );
            return;
        };

        let result = binding_object(&shiny, binding).and_then(|object| {
            let registry = Reflect::get(&shiny, &JsValue::from_str("outputBindings"))?;
            call_method(&registry, "register", &[&object, &JsValue::from_str(binding_name)])
        });
        if let Err(e) = result {
            leptos::logging::error!(
                "[BrowserHost] Failed to register output binding {}: {:?}",
                binding_name,
                e
            );
        }
    }

    fn bind_all(&self) {
        if let Some(body) = document().and_then(|d| d.body()) {
            call_shiny("bindAll", &[&body]);
        }
    }

    fn unbind_all(&self) {
        if let Some(body) = document().and_then(|d| d.body()) {
            call_shiny("unbindAll", &[&body]);
        }
    }

    fn create_anchor(&self, id: &str, class: &str) {
        let Some(document) = document() else {
            return;
        };
        let Some(body) = document.body() else {
            return;
        };

        let anchor = match document.create_element("div") {
            Ok(el) => el,
            Err(e) => {
                leptos::logging::error!("[BrowserHost] Cannot create anchor for {}: {:?}", id, e);
                return;
            }
        };
        anchor.set_id(id);
        anchor.set_class_name(class);
        anchor.set_text_content(Some(&format!("Output anchor for {}", id)));
        if let Some(html) = anchor.dyn_ref::<HtmlElement>() {
            let _ = html.style().set_property("visibility", "hidden");
        }
        if let Err(e) = body.append_child(&anchor) {
            leptos::logging::error!("[BrowserHost] Cannot attach anchor for {}: {:?}", id, e);
        }
    }

    fn find_by_class(&self, scope: &Scope, class: &str) -> Vec<String> {
        let Some(document) = document() else {
            return Vec::new();
        };
        match scope {
            Scope::Document => collection_ids(&document.get_elements_by_class_name(class)),
            Scope::Element(id) => document
                .get_element_by_id(id)
                .map(|root| collection_ids(&root.get_elements_by_class_name(class)))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    /// Binding that reports a fixed set of ids for every scope.
    struct FixedBinding(Vec<String>);

    impl OutputBinding for FixedBinding {
        fn find(&self, _scope: &Scope) -> Vec<String> {
            self.0.clone()
        }
        fn render_value(&self, _element_id: &str, _data: &Value) {}
        fn render_error(&self, _element_id: &str, _error: &OutputError) {}
        fn show_progress(&self, _element_id: &str, _show: bool) {}
    }

    fn append_div(parent: &Element, id: Option<&str>) -> Element {
        let document = document().unwrap();
        let div = document.create_element("div").unwrap();
        if let Some(id) = id {
            div.set_id(id);
        }
        parent.append_child(&div).unwrap();
        div
    }

    fn ids(elements: Vec<Element>) -> Vec<String> {
        elements.iter().map(Element::id).collect()
    }

    #[wasm_bindgen_test]
    fn test_find_in_unnamed_scope_stays_inside_it() {
        let body: Element = document().unwrap().body().unwrap().into();
        let container = append_div(&body, None);
        append_div(&container, Some("scoped_inner"));
        append_div(&body, Some("scoped_outer"));

        let binding = FixedBinding(vec!["scoped_inner".into(), "scoped_outer".into()]);

        assert_eq!(ids(find_elements(&binding, &JsValue::from(container))), vec!["scoped_inner"]);
    }

    #[wasm_bindgen_test]
    fn test_find_in_document_scope_returns_everything() {
        let document = document().unwrap();
        let body: Element = document.body().unwrap().into();
        append_div(&body, Some("doc_a"));
        append_div(&body, Some("doc_b"));

        let binding = FixedBinding(vec!["doc_a".into(), "doc_b".into()]);

        assert_eq!(ids(find_elements(&binding, &JsValue::from(document))), vec!["doc_a", "doc_b"]);
    }

    #[wasm_bindgen_test]
    fn test_find_excludes_the_scope_element_itself() {
        let body: Element = document().unwrap().body().unwrap().into();
        let root = append_div(&body, Some("scope_self"));

        let binding = FixedBinding(vec!["scope_self".into()]);

        assert!(find_elements(&binding, &JsValue::from(root)).is_empty());
    }
}
