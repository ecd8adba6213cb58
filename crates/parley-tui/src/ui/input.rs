//! Text input bar.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let listening = app.status.as_ref().is_some_and(|s| s.listening);
    let (title, border_color) = if listening {
        (" Listening... ", Color::Magenta)
    } else {
        (
            " Message (Enter send · Ctrl+R voice · Esc stop · Ctrl+C quit) ",
            Color::Cyan,
        )
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::White));
    frame.render_widget(input, inner);

    // Show cursor
    frame.set_cursor_position(Position::new(
        inner.x + app.input.chars().count() as u16,
        inner.y,
    ));
}
