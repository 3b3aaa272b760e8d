use std::time::Duration;

use shiny_leptos_common::{
    DEFAULT_DEBOUNCE, MESSAGE_CHANNEL, OUTPUT_BINDING_NAME, OUTPUT_CLASS, SET_INPUTS_CHANNEL,
};

/// Session-wide settings.
///
/// The defaults match the channel names used by the Python server package,
/// so most applications never need to build one by hand.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shiny_leptos::ShinyConfig;
///
/// let config = ShinyConfig::builder()
///     .default_debounce(Duration::from_millis(250))
///     .message_channel("myAppMessage")
///     .build();
///
/// assert_eq!(config.default_debounce(), Duration::from_millis(250));
/// assert_eq!(config.message_channel(), "myAppMessage");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ShinyConfig {
    default_debounce: Duration,
    output_class: String,
    binding_name: String,
    message_channel: String,
    set_inputs_channel: String,
}

impl ShinyConfig {
    pub fn builder() -> ShinyConfigBuilder {
        ShinyConfigBuilder::new()
    }

    /// Debounce window for inputs registered without one.
    pub fn default_debounce(&self) -> Duration {
        self.default_debounce
    }

    /// Marker class carried by output anchors.
    pub fn output_class(&self) -> &str {
        &self.output_class
    }

    /// Name the output binding is registered under.
    pub fn binding_name(&self) -> &str {
        &self.binding_name
    }

    /// Custom message channel carrying `{type, data}` envelopes.
    pub fn message_channel(&self) -> &str {
        &self.message_channel
    }

    /// Custom message channel the server uses to set client inputs.
    pub fn set_inputs_channel(&self) -> &str {
        &self.set_inputs_channel
    }
}

impl Default for ShinyConfig {
    fn default() -> Self {
        Self {
            default_debounce: DEFAULT_DEBOUNCE,
            output_class: OUTPUT_CLASS.to_string(),
            binding_name: OUTPUT_BINDING_NAME.to_string(),
            message_channel: MESSAGE_CHANNEL.to_string(),
            set_inputs_channel: SET_INPUTS_CHANNEL.to_string(),
        }
    }
}

/// Builder for [`ShinyConfig`].
pub struct ShinyConfigBuilder {
    config: ShinyConfig,
}

impl ShinyConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ShinyConfig::default(),
        }
    }

    pub fn default_debounce(mut self, wait: Duration) -> Self {
        self.config.default_debounce = wait;
        self
    }

    pub fn output_class(mut self, class: impl Into<String>) -> Self {
        self.config.output_class = class.into();
        self
    }

    pub fn binding_name(mut self, name: impl Into<String>) -> Self {
        self.config.binding_name = name.into();
        self
    }

    pub fn message_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.message_channel = channel.into();
        self
    }

    pub fn set_inputs_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.set_inputs_channel = channel.into();
        self
    }

    pub fn build(self) -> ShinyConfig {
        self.config
    }
}

impl Default for ShinyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
