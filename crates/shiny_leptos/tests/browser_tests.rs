#![cfg(target_arch = "wasm32")]

use shiny_leptos::{BrowserHost, Scope, ShinyHost};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn test_anchor_is_hidden_and_found_by_class() {
    let host = BrowserHost::new();
    host.create_anchor("browser_plot", "shiny-leptos-output");

    let found = host.find_by_class(&Scope::Document, "shiny-leptos-output");
    assert!(found.contains(&"browser_plot".to_string()));

    let anchor = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id("browser_plot"))
        .expect("anchor in document");
    assert_eq!(anchor.class_name(), "shiny-leptos-output");
}

#[wasm_bindgen_test]
fn test_element_scope_without_match_is_empty() {
    let host = BrowserHost::new();
    let scope = Scope::Element("missing".to_string());
    assert!(host.find_by_class(&scope, "shiny-leptos-output").is_empty());
}

#[wasm_bindgen_test]
fn test_calls_without_shiny_runtime_do_not_panic() {
    let host = BrowserHost::new();
    host.set_input_value("x", serde_json::json!(1), Default::default());
    host.bind_all();
    host.unbind_all();
}
