//! Status bar — phase, follow-up, latest notice.

use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use parley_core::types::Phase;

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let phase = app.status.as_ref().map(|s| s.phase).unwrap_or(Phase::Idle);

    let phase_color = match phase {
        Phase::Idle => Color::DarkGray,
        Phase::Requesting => Color::Yellow,
        Phase::Rendering => Color::Green,
        Phase::Interrupted => Color::Red,
    };

    let mut spans = vec![Span::styled(
        format!(" {} ", phase),
        Style::default().fg(Color::Black).bg(phase_color),
    )];

    if app.status.as_ref().is_some_and(|s| s.follow_up_armed) {
        spans.push(Span::raw(" follow-up armed "));
    }

    if let Some(notice) = &app.notice {
        spans.push(Span::styled(
            format!(" {} ", notice),
            Style::default().fg(Color::Yellow),
        ));
    }

    let status = Paragraph::new(Line::from(spans));
    frame.render_widget(status, area);
}
