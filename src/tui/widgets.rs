//! Shared widgets and colors

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use decision_queue::{PlanStatus, Priority};

// Color scheme
pub const COLOR_BG: Color = Color::Rgb(9, 8, 12);
pub const COLOR_PANEL: Color = Color::Rgb(9, 8, 12);
pub const COLOR_ACCENT: Color = Color::Rgb(159, 160, 156);
pub const COLOR_FOCUS: Color = Color::Cyan;
pub const COLOR_HIGHLIGHT: Color = Color::Rgb(56, 80, 109);

pub fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Urgent => Color::Red,
        Priority::High => Color::Yellow,
        Priority::Normal => Color::Blue,
        Priority::Low => Color::DarkGray,
    }
}

pub fn status_color(status: PlanStatus) -> Color {
    match status {
        PlanStatus::Pending => Color::Gray,
        PlanStatus::InProgress => Color::Cyan,
        PlanStatus::Ready => Color::Green,
        PlanStatus::Completed => Color::DarkGray,
    }
}

/// Status message tone for styling
#[derive(Clone, Copy, Default)]
pub enum StatusTone {
    #[default]
    Info,
    Success,
    Error,
    Warning,
}

impl StatusTone {
    pub fn color(self) -> Color {
        match self {
            StatusTone::Info => Color::Cyan,
            StatusTone::Success => Color::Green,
            StatusTone::Error => Color::Red,
            StatusTone::Warning => Color::Yellow,
        }
    }
}

/// Create a themed block with consistent styling
pub fn themed_block(title: impl Into<String>, border_color: Color) -> Block<'static> {
    Block::default()
        .title(Span::styled(
            title.into(),
            Style::default()
                .fg(border_color)
                .add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(COLOR_PANEL).fg(Color::White))
}

/// Create a centered rectangle for modal dialogs
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);
    let vertical_chunk = popup_layout[1];
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical_chunk)[1]
}

/// Draw a one-line input box at the bottom of the screen
pub fn draw_prompt(frame: &mut Frame<'_>, area: Rect, title: &str, text: &str) {
    let height = 3;
    if area.height < height + 2 {
        return;
    }
    let popup = Rect {
        x: area.x + 2,
        y: area.y + area.height - height - 1,
        width: area.width.saturating_sub(4),
        height,
    };
    frame.render_widget(Clear, popup);
    let block = themed_block(title, COLOR_ACCENT);
    let inner = block.inner(popup);
    frame.render_widget(block, popup);
    let paragraph = Paragraph::new(text.to_string())
        .style(Style::default().bg(COLOR_PANEL).fg(Color::White))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner);
}

/// Draw the `:` command palette
pub fn draw_command_palette(frame: &mut Frame<'_>, area: Rect, buffer: &str) {
    draw_prompt(frame, area, "Command", &format!(":{}", buffer));
}

/// Draw a centered yes/no dialog
pub fn draw_confirm(frame: &mut Frame<'_>, area: Rect, message: &str) {
    let popup = centered_rect(50, 20, area);
    frame.render_widget(Clear, popup);
    let lines = vec![
        Line::from(message.to_string()),
        Line::default(),
        Line::styled(
            "y confirm · any other key cancels",
            Style::default().fg(Color::DarkGray),
        ),
    ];
    let paragraph = Paragraph::new(lines)
        .style(Style::default().bg(COLOR_PANEL).fg(Color::White))
        .block(themed_block("Confirm", COLOR_FOCUS))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, popup);
}

/// Draw a status bar with message and help text
pub fn draw_status_bar(
    frame: &mut Frame<'_>,
    area: Rect,
    message: &str,
    tone: StatusTone,
    state_line: &str,
    help_line: &str,
) {
    let info = Line::styled(
        message,
        Style::default()
            .fg(tone.color())
            .add_modifier(Modifier::BOLD),
    );
    let state = Line::from(state_line.to_string());
    let help = Line::from(help_line.to_string());

    let paragraph = Paragraph::new(vec![info, state, help])
        .style(Style::default().bg(COLOR_PANEL).fg(Color::White))
        .block(themed_block("Status", COLOR_ACCENT))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}
