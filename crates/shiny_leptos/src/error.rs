use thiserror::Error;

/// Errors reported by the shiny_leptos registry and dispatcher.
///
/// None of these are raised as panics. Operations log them where they are
/// detected and hand them back so callers can decide whether to care.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShinyError {
    /// An input or output was registered with an empty name.
    #[error("Input and output names must not be empty")]
    EmptyName,

    /// A value was set for an input nobody registered.
    #[error("Input '{name}' not found")]
    UnknownInput {
        /// Name of the missing input
        name: String,
    },

    /// The host drove an output that has no registry entry.
    #[error("Output '{name}' not found")]
    UnknownOutput {
        /// Name of the missing output
        name: String,
    },

    /// A value could not be converted to or from JSON.
    #[error("Failed to convert value for '{name}': {error}")]
    Serialization {
        /// Input, output or message type the value belongs to
        name: String,
        /// Error message from serde_json
        error: String,
    },

    /// A custom message did not decode as a `{type, data}` envelope.
    #[error("Malformed custom message: {error}")]
    MalformedMessage {
        /// Error message from serde_json
        error: String,
    },
}

impl ShinyError {
    pub(crate) fn serialization(name: &str, error: serde_json::Error) -> Self {
        ShinyError::Serialization {
            name: name.to_string(),
            error: error.to_string(),
        }
    }
}
