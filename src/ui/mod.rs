pub mod matrix;

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use crate::scheduler::BoardSnapshot;
use crate::session::ConnectionState;
use matrix::MatrixView;

struct StatusBar<'a> {
    state: ConnectionState,
    primary: Option<&'a str>,
    skipped_cycles: u64,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state_color = match self.state {
            ConnectionState::Streaming => Color::Green,
            ConnectionState::Subscribed | ConnectionState::Connecting => Color::Yellow,
            ConnectionState::Reconnecting | ConnectionState::Disconnected => Color::Red,
            ConnectionState::Shutdown => Color::DarkGray,
        };
        let line = Line::from(vec![
            Span::styled(
                " ticker-board ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("| ", Style::default().fg(Color::DarkGray)),
            Span::styled(self.state.label(), Style::default().fg(state_color)),
            Span::styled(" | ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                self.primary.unwrap_or("-").to_string(),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                format!(" | skipped {}", self.skipped_cycles),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        Paragraph::new(line).render(area, buf);
    }
}

pub fn render(frame: &mut Frame, snapshot: &BoardSnapshot) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(4),    // matrix preview
            Constraint::Length(1), // keybinds
        ])
        .split(frame.area());

    frame.render_widget(
        StatusBar {
            state: snapshot.state,
            primary: snapshot.primary.as_deref(),
            skipped_cycles: snapshot.skipped_cycles,
        },
        outer[0],
    );
    frame.render_widget(MatrixView::new(&snapshot.frame), outer[1]);
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            " [Q]uit ",
            Style::default().fg(Color::DarkGray),
        ))),
        outer[2],
    );
}
