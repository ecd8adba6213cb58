//! Core types — Phase, ChatMessage, MessageId, SessionSnapshot, Voice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Controller phase ──

/// Where the current cycle stands. Derived from the session state, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Requesting,
    Rendering,
    Interrupted,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Requesting => write!(f, "requesting"),
            Phase::Rendering => write!(f, "rendering"),
            Phase::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    User,
    FollowUp,
}

// ── Chat messages ──

/// Opaque handle for an incoming message, issued by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Pending,
    Streaming,
    Complete,
}

/// A rendered chat line. Transient; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<MessageId>,
    pub direction: Direction,
    pub text: String,
    pub render_state: RenderState,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn outgoing(text: impl Into<String>) -> Self {
        Self {
            id: None,
            direction: Direction::Outgoing,
            text: text.into(),
            render_state: RenderState::Complete,
            at: Utc::now(),
        }
    }

    pub fn placeholder(id: MessageId) -> Self {
        Self {
            id: Some(id),
            direction: Direction::Incoming,
            text: String::new(),
            render_state: RenderState::Pending,
            at: Utc::now(),
        }
    }
}

// ── Session snapshot ──

/// Read-only view of the controller's session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub busy: bool,
    pub cancel_requested: bool,
    pub pending_user_text: Option<String>,
    pub typing_active: bool,
    pub follow_up_armed: bool,
    pub listening: bool,
    pub cycles: u64,
}

// ── Speech ──

/// Locale and rate handed to the speech output driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub locale: String,
    pub rate: f32,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            rate: 1.0,
        }
    }
}
