use std::time::Duration;

use leptos::html::Img;
use leptos::prelude::*;
use leptos_use::use_resize_observer;
use shiny_leptos_common::{ImageData, clientdata_input_name};

use crate::debounce::Debouncer;
use crate::hooks::{use_shiny_input, use_shiny_output, use_shiny_session};

/// Displays a server-rendered image or plot output.
///
/// The rendered size is reported back to the server through the output's
/// client-data inputs, so plots are drawn at the size they are shown at. It
/// is re-reported whenever the image loads and, debounced, when it resizes.
///
/// # Example
///
/// ```rust,ignore
/// use shiny_leptos::ImageOutput;
///
/// #[component]
/// fn PlotCard() -> impl IntoView {
///     view! {
///         <div class="card">
///             <ImageOutput id="plot1" class="plot" />
///         </div>
///     }
/// }
/// ```
#[component]
pub fn ImageOutput(
    /// Output name
    #[prop(into)]
    id: String,
    /// CSS class applied to the `<img>`
    #[prop(optional, into)]
    class: Option<String>,
) -> impl IntoView {
    let (_, set_width) = use_shiny_input::<Option<i32>>(clientdata_input_name(&id, "width"), None);
    let (_, set_height) =
        use_shiny_input::<Option<i32>>(clientdata_input_name(&id, "height"), None);
    let _ = use_shiny_input::<bool>(clientdata_input_name(&id, "hidden"), false);
    let (image, recalculating) = use_shiny_output::<ImageData>(id, None);

    let img_ref = NodeRef::<Img>::new();

    let report_size = move || {
        if let Some(img) = img_ref.get_untracked() {
            set_width(Some(img.client_width()));
            set_height(Some(img.client_height()));
        }
    };

    let resized = Debouncer::new(
        use_shiny_session().scheduler().clone(),
        Duration::from_millis(400),
        {
            let report_size = report_size.clone();
            move |()| report_size()
        },
    );
    use_resize_observer(img_ref, move |_, _| resized.call(()));

    let img_class = move || {
        let mut classes = class.clone().unwrap_or_default();
        if recalculating.get() {
            if !classes.is_empty() {
                classes.push(' ');
            }
            classes.push_str("recalculating");
        }
        classes
    };

    view! {
        <img
            node_ref=img_ref
            class=img_class
            src=move || image.get().map(|img| img.src).unwrap_or_default()
            alt=move || image.get().and_then(|img| img.alt).unwrap_or_default()
            on:load=move |_| report_size()
        />
    }
}
