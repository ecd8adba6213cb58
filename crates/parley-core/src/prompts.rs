//! Fixed user-facing strings and the follow-up prompt template.

/// Shown when the model answered but produced no usable text.
pub const EMPTY_REPLY: &str = "I'm sorry, I couldn't process that. Please try again.";

/// Shown when the model could not be reached or its reply could not be read.
pub const CONNECTION_ERROR: &str = "Error: Could not connect to the API.";

/// Typed and spoken when the follow-up request comes back empty.
pub const DEFAULT_CHECK_IN: &str =
    "How are you doing? Let me know if you'd like to continue chatting.";

/// Shown when the follow-up request fails.
pub const FOLLOW_UP_ERROR: &str = "Something went wrong while generating the follow-up message.";

/// Shown when dictation fails.
pub const SPEECH_NOT_RECOGNIZED: &str = "Could not recognize speech. Please try again.";

/// Shown when dictation is requested but no recognizer is configured.
pub const SPEECH_INPUT_UNAVAILABLE: &str = "Voice input is not configured.";

/// Build the check-in prompt around the user's original message.
pub fn follow_up_prompt(user_text: &str) -> String {
    format!(
        "Generate a follow-up message for this previous user prompt to check on their progress or well-being: \"{}\"",
        user_text
    )
}
