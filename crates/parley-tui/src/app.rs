//! App state and chat event handling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use parley_core::events::ChatEvent;
use parley_core::types::{ChatMessage, MessageId, RenderState, SessionSnapshot};

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Dictate,
    Stop,
    Submit,
    Insert(char),
    Backspace,
    ScrollUp,
    ScrollDown,
}

/// Map a key press to an action. Unbound Ctrl/Alt combos do nothing.
pub fn key_action(key: KeyEvent) -> Option<KeyAction> {
    let action = match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL)
        | (KeyCode::Char('q'), KeyModifiers::CONTROL) => KeyAction::Quit,
        (KeyCode::Char('r'), KeyModifiers::CONTROL) | (KeyCode::F(2), _) => KeyAction::Dictate,
        (KeyCode::Esc, _) | (KeyCode::Char('s'), KeyModifiers::CONTROL) => KeyAction::Stop,
        (KeyCode::Enter, _) => KeyAction::Submit,
        (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => KeyAction::Insert(c),
        (KeyCode::Backspace, _) => KeyAction::Backspace,
        (KeyCode::PageUp, _) | (KeyCode::Up, _) => KeyAction::ScrollUp,
        (KeyCode::PageDown, _) | (KeyCode::Down, _) => KeyAction::ScrollDown,
        _ => return None,
    };
    Some(action)
}

/// The main application state.
pub struct App {
    pub messages: Vec<ChatMessage>,
    pub status: Option<SessionSnapshot>,
    pub notice: Option<String>,
    pub input: String,
    pub scroll_offset: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        App {
            messages: Vec::new(),
            status: None,
            notice: None,
            input: String::new(),
            scroll_offset: 0,
            should_quit: false,
        }
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| m.id == Some(id))
    }

    /// Apply one rendering event from the controller.
    pub fn handle_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Outgoing { text } => {
                // The field is only consumed once the controller accepted it
                if self.input.trim() == text {
                    self.input.clear();
                }
                self.notice = None;
                self.messages.push(ChatMessage::outgoing(text));
                // Auto-scroll to bottom
                self.scroll_offset = 0;
            }
            ChatEvent::Placeholder { id } => {
                self.messages.push(ChatMessage::placeholder(id));
                self.scroll_offset = 0;
            }
            ChatEvent::Streaming { id } => {
                if let Some(msg) = self.message_mut(id) {
                    msg.text.clear();
                    msg.render_state = RenderState::Streaming;
                }
            }
            ChatEvent::Append { id, ch } => {
                if let Some(msg) = self.message_mut(id) {
                    msg.text.push(ch);
                }
            }
            ChatEvent::Replace { id, text } => {
                if let Some(msg) = self.message_mut(id) {
                    msg.text = text;
                }
            }
            ChatEvent::Finalize { id } => {
                if let Some(msg) = self.message_mut(id) {
                    msg.render_state = RenderState::Complete;
                }
            }
            ChatEvent::Notice { text } => {
                self.notice = Some(text);
            }
            ChatEvent::InputFilled { text } => {
                self.input = text;
            }
            ChatEvent::Status(snapshot) => {
                self.status = Some(snapshot);
            }
        }
    }

    /// Text to submit from the input field, if any. The field itself is
    /// cleared when the outgoing message comes back.
    pub fn take_submission(&self) -> Option<String> {
        let text = self.input.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}
