//! parley-core — Pure conversation logic, no UI.
//!
//! This crate owns the conversation controller: the single-flight
//! request/response cycle against a language model, the typing-simulation
//! stream, spoken output, voice dictation and the one-shot follow-up
//! check-in. It is completely UI-agnostic. Frontends implement
//! [`render::Renderer`] or subscribe to [`events::ChatEvent`]s.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod prompts;
pub mod providers;
pub mod render;
pub mod scheduler;
pub mod speech;
pub mod types;
pub mod typing;
