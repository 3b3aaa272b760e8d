pub mod messages;
pub use messages::*;

use std::time::Duration;

/// Custom message channel every `{type, data}` envelope arrives on.
///
/// Matches the channel the Python server package sends to
/// (`session.send_custom_message("shinyReactMessage", ...)`).
pub const MESSAGE_CHANNEL: &str = "shinyReactMessage";

/// Custom message channel the server uses to overwrite client input values.
pub const SET_INPUTS_CHANNEL: &str = "shinyReactSetInputs";

/// Marker class carried by every hidden output anchor.
pub const OUTPUT_CLASS: &str = "shiny-leptos-output";

/// Name the output binding is registered under with the host.
pub const OUTPUT_BINDING_NAME: &str = "shiny.leptosOutput";

/// Debounce window applied to input sends when none is requested.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Builds the name of a host client-data input for an output.
///
/// The host reports output geometry through inputs named
/// `.clientdata_output_<id>_<field>`, e.g. `.clientdata_output_plot1_width`.
pub fn clientdata_input_name(output_id: &str, field: &str) -> String {
    format!(".clientdata_output_{}_{}", output_id, field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clientdata_input_name() {
        assert_eq!(
            clientdata_input_name("plot1", "width"),
            ".clientdata_output_plot1_width"
        );
        assert_eq!(
            clientdata_input_name("my.plot", "hidden"),
            ".clientdata_output_my.plot_hidden"
        );
    }

    #[test]
    fn test_default_debounce_is_100ms() {
        assert_eq!(DEFAULT_DEBOUNCE.as_millis(), 100);
    }
}
