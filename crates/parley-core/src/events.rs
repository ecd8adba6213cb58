//! ChatEvent enum — broadcast from the controller's renderer to frontends via tokio::broadcast.

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, SessionSnapshot};

/// Rendering instructions, in the order the controller issued them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChatEvent {
    /// The user's message
    #[serde(rename = "outgoing")]
    Outgoing { text: String },

    /// A new incoming message, still waiting on the model
    #[serde(rename = "placeholder")]
    Placeholder { id: MessageId },

    /// The incoming message is about to be typed out
    #[serde(rename = "streaming")]
    Streaming { id: MessageId },

    /// One typed character
    #[serde(rename = "append")]
    Append { id: MessageId, ch: char },

    /// Whole-text replacement (fallback and error strings)
    #[serde(rename = "replace")]
    Replace { id: MessageId, text: String },

    /// The incoming message will not change any more
    #[serde(rename = "finalize")]
    Finalize { id: MessageId },

    /// Transient user-visible notice
    #[serde(rename = "notice")]
    Notice { text: String },

    /// Dictated text for the input field
    #[serde(rename = "input")]
    InputFilled { text: String },

    /// Controller state changed
    #[serde(rename = "status")]
    Status(SessionSnapshot),
}
