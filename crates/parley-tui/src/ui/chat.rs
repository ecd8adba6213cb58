//! Scrollable chat feed — the user's messages and the typed replies.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use parley_core::types::{Direction as Side, RenderState};

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Chat ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.messages.is_empty() {
        let empty = Paragraph::new("Say something...")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    // Build display lines from messages (bottom-up with scroll offset)
    let visible_height = inner.height as usize;
    let total = app.messages.len();
    let end = total.saturating_sub(app.scroll_offset);
    let start = end.saturating_sub(visible_height * 2); // overshoot for wrapping

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.messages[start..end] {
        let (fg, prefix) = match msg.direction {
            Side::Outgoing => (Color::Yellow, "you  "),
            Side::Incoming => (Color::Green, "bot  "),
        };

        if msg.render_state == RenderState::Pending {
            lines.push(Line::styled(
                format!("{}...", prefix),
                Style::default().fg(Color::DarkGray),
            ));
            continue;
        }

        let mut text = msg.text.clone();
        if msg.render_state == RenderState::Streaming {
            text.push('▌');
        }
        for (i, line) in text.lines().enumerate() {
            let lead = if i == 0 { prefix } else { "     " };
            lines.push(Line::styled(
                format!("{}{}", lead, line),
                Style::default().fg(fg),
            ));
        }
        lines.push(Line::raw(""));
    }

    let overflow = lines.len().saturating_sub(visible_height) as u16;
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((overflow, 0));
    frame.render_widget(paragraph, inner);
}
