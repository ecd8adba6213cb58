//! Renderer seam between the controller and whatever draws the chat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::events::ChatEvent;
use crate::types::{ChatMessage, MessageId, RenderState, SessionSnapshot};

/// Everything the controller needs from a presentation layer.
///
/// Calls are cheap and synchronous; implementations must not block.
pub trait Renderer: Send + Sync {
    fn render_outgoing(&self, text: &str);

    /// Add an empty incoming message in the `Pending` state.
    fn render_incoming_placeholder(&self) -> MessageId;

    fn begin_streaming(&self, id: MessageId);

    fn append_to_incoming(&self, id: MessageId, ch: char);

    fn set_incoming_text(&self, id: MessageId, text: &str);

    fn finalize_incoming(&self, id: MessageId);

    /// Show a transient notice (alert).
    fn notify(&self, text: &str);

    /// Put dictated text into the input field.
    fn fill_input(&self, text: &str);

    fn status(&self, _snapshot: &SessionSnapshot) {}
}

// ── Broadcast renderer ──

/// Forwards every call as a [`ChatEvent`] to all subscribers.
pub struct EventRenderer {
    event_tx: broadcast::Sender<ChatEvent>,
    next_id: AtomicU64,
}

impl EventRenderer {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            event_tx,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for EventRenderer {
    fn render_outgoing(&self, text: &str) {
        self.broadcast(ChatEvent::Outgoing {
            text: text.to_string(),
        });
    }

    fn render_incoming_placeholder(&self) -> MessageId {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.broadcast(ChatEvent::Placeholder { id });
        id
    }

    fn begin_streaming(&self, id: MessageId) {
        self.broadcast(ChatEvent::Streaming { id });
    }

    fn append_to_incoming(&self, id: MessageId, ch: char) {
        self.broadcast(ChatEvent::Append { id, ch });
    }

    fn set_incoming_text(&self, id: MessageId, text: &str) {
        self.broadcast(ChatEvent::Replace {
            id,
            text: text.to_string(),
        });
    }

    fn finalize_incoming(&self, id: MessageId) {
        self.broadcast(ChatEvent::Finalize { id });
    }

    fn notify(&self, text: &str) {
        self.broadcast(ChatEvent::Notice {
            text: text.to_string(),
        });
    }

    fn fill_input(&self, text: &str) {
        self.broadcast(ChatEvent::InputFilled {
            text: text.to_string(),
        });
    }

    fn status(&self, snapshot: &SessionSnapshot) {
        self.broadcast(ChatEvent::Status(snapshot.clone()));
    }
}

// ── In-memory transcript ──

#[derive(Default)]
struct TranscriptInner {
    messages: Vec<ChatMessage>,
    notices: Vec<String>,
    input: String,
    next_id: u64,
}

/// Keeps the rendered conversation in memory.
#[derive(Default)]
pub struct Transcript {
    inner: Mutex<TranscriptInner>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TranscriptInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn message(&self, id: MessageId) -> Option<ChatMessage> {
        self.lock()
            .messages
            .iter()
            .find(|m| m.id == Some(id))
            .cloned()
    }

    pub fn notices(&self) -> Vec<String> {
        self.lock().notices.clone()
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    fn with_message(&self, id: MessageId, f: impl FnOnce(&mut ChatMessage)) {
        let mut inner = self.lock();
        if let Some(msg) = inner.messages.iter_mut().find(|m| m.id == Some(id)) {
            f(msg);
        }
    }
}

impl Renderer for Transcript {
    fn render_outgoing(&self, text: &str) {
        let mut inner = self.lock();
        inner.messages.push(ChatMessage::outgoing(text));
        // Submitting consumes the input field.
        inner.input.clear();
    }

    fn render_incoming_placeholder(&self) -> MessageId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = MessageId(inner.next_id);
        inner.messages.push(ChatMessage::placeholder(id));
        id
    }

    fn begin_streaming(&self, id: MessageId) {
        self.with_message(id, |m| {
            m.text.clear();
            m.render_state = RenderState::Streaming;
        });
    }

    fn append_to_incoming(&self, id: MessageId, ch: char) {
        self.with_message(id, |m| m.text.push(ch));
    }

    fn set_incoming_text(&self, id: MessageId, text: &str) {
        self.with_message(id, |m| m.text = text.to_string());
    }

    fn finalize_incoming(&self, id: MessageId) {
        self.with_message(id, |m| m.render_state = RenderState::Complete);
    }

    fn notify(&self, text: &str) {
        self.lock().notices.push(text.to_string());
    }

    fn fill_input(&self, text: &str) {
        self.lock().input = text.to_string();
    }
}
