//! Error types for the external collaborators.

use thiserror::Error;

/// Failure calling the text generation service. Every variant is a transport
/// failure from the controller's point of view.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API key configured for provider '{0}'")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    Exit { program: String, status: String },

    #[error("speech command is empty")]
    EmptyCommand,

    #[error("no speech was recognized")]
    NoMatch,

    #[error("speech task failed: {0}")]
    Task(String),

    #[error("speech I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
