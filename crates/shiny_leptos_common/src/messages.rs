use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Priority marker passed along with an input value.
///
/// `Event` forces the server to treat the value as a fresh change even when it
/// is identical to the previous one (repeated button clicks sending `{}`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Deferred,
    Immediate,
    Event,
}

/// Options forwarded to the host's raw input setter.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetInputOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<EventPriority>,
}

impl SetInputOptions {
    pub fn with_priority(priority: EventPriority) -> Self {
        Self {
            priority: Some(priority),
        }
    }

    /// Returns `self` with `priority` replaced when `other` carries one.
    pub fn overridden_by(self, other: Option<SetInputOptions>) -> Self {
        match other.and_then(|o| o.priority) {
            Some(priority) => Self {
                priority: Some(priority),
            },
            None => self,
        }
    }
}

/// Envelope multiplexed over [`MESSAGE_CHANNEL`](crate::MESSAGE_CHANNEL).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CustomMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
}

impl CustomMessage {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }
}

/// Error payload the host hands to an output binding when the server-side
/// render function fails.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OutputError {
    pub message: String,
    #[serde(default)]
    pub call: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<Vec<String>>,
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.call.is_empty() {
            write!(f, " (in {})", self.call.join(" "))?;
        }
        if let Some(types) = &self.error_type {
            write!(f, " [{}]", types.join(", "))?;
        }
        Ok(())
    }
}

/// Value of a server-rendered image or plot output.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ImageData {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordmap: Option<Value>,
}
