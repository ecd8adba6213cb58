//! Typing simulation — reveals a reply one character per tick.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::render::Renderer;
use crate::types::MessageId;

/// How a typing stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingOutcome {
    Completed,
    /// Stopped after `typed` characters; those stay on screen.
    Interrupted { typed: usize },
}

/// Append `text` to message `id` one character every `interval`.
///
/// The first character lands one interval after the call. Cancellation is
/// observed before every append, so nothing is appended once `cancel` fires.
/// The message is finalized on every exit.
pub async fn type_out(
    renderer: &dyn Renderer,
    id: MessageId,
    text: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> TypingOutcome {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() yields immediately on the first tick
    ticker.tick().await;

    let mut typed = 0;
    let mut outcome = TypingOutcome::Completed;
    for ch in text.chars() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome = TypingOutcome::Interrupted { typed };
                break;
            }
            _ = ticker.tick() => {}
        }
        renderer.append_to_incoming(id, ch);
        typed += 1;
    }

    renderer.finalize_incoming(id);
    outcome
}
