//! Queue view - pending plans, their decisions, and the selected decision

use chrono::Utc;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use decision_queue::{Decision, DecisionStatus, Plan};

use crate::tui::widgets::{
    priority_color, status_color, themed_block, COLOR_ACCENT, COLOR_FOCUS, COLOR_HIGHLIGHT,
    COLOR_PANEL,
};
use crate::tui::{ellipsize, format_age, wrap_text};

/// Which pane is focused
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueuePane {
    #[default]
    Plans,
    Decisions,
    Detail,
}

impl QueuePane {
    pub fn next(self) -> Self {
        match self {
            QueuePane::Plans => QueuePane::Decisions,
            QueuePane::Decisions => QueuePane::Detail,
            QueuePane::Detail => QueuePane::Plans,
        }
    }
}

#[derive(Default)]
pub struct QueueViewState {
    /// Snapshot of the pending list, in queue order
    pub plans: Vec<Plan>,

    pub active_pane: QueuePane,

    pub plans_state: ListState,
    pub decisions_state: ListState,

    pub detail_scroll: u16,
}

fn clamp_step(current: Option<usize>, delta: isize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let current = current.unwrap_or(0) as isize;
    Some((current + delta).clamp(0, len as isize - 1) as usize)
}

impl QueueViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the plan list, keeping the selection on the same plan and
    /// decision when they still exist
    pub fn set_plans(&mut self, plans: Vec<Plan>) {
        let selected_plan = self.selected_plan().map(|p| p.id.clone());
        let selected_decision = self.selected_decision().map(|d| d.id.clone());
        self.plans = plans;

        let plan_idx = selected_plan
            .and_then(|id| self.plans.iter().position(|p| p.id == id))
            .or_else(|| self.plans_state.selected().map(|i| i.min(self.plans.len().saturating_sub(1))))
            .or(Some(0))
            .filter(|_| !self.plans.is_empty());
        let plan_changed = plan_idx != self.plans_state.selected();
        self.plans_state.select(plan_idx);

        let decision_idx = match self.selected_plan() {
            None => None,
            Some(plan) => selected_decision
                .and_then(|id| plan.decision_index(&id))
                .or_else(|| first_open(plan)),
        };
        if plan_changed {
            self.detail_scroll = 0;
        }
        self.decisions_state.select(decision_idx);
    }

    pub fn selected_plan(&self) -> Option<&Plan> {
        self.plans_state.selected().and_then(|i| self.plans.get(i))
    }

    pub fn selected_decision(&self) -> Option<&Decision> {
        let plan = self.selected_plan()?;
        self.decisions_state
            .selected()
            .and_then(|i| plan.decisions.get(i))
    }

    pub fn cycle_pane(&mut self) {
        self.active_pane = self.active_pane.next();
    }

    pub fn move_selection(&mut self, delta: isize) {
        match self.active_pane {
            QueuePane::Plans => {
                let next = clamp_step(self.plans_state.selected(), delta, self.plans.len());
                if next != self.plans_state.selected() {
                    self.plans_state.select(next);
                    let decision = self.selected_plan().and_then(first_open);
                    self.decisions_state.select(decision);
                    self.detail_scroll = 0;
                }
            }
            QueuePane::Decisions => {
                let len = self.selected_plan().map_or(0, |p| p.decisions.len());
                let next = clamp_step(self.decisions_state.selected(), delta, len);
                self.decisions_state.select(next);
                self.detail_scroll = 0;
            }
            QueuePane::Detail => {
                self.detail_scroll = (self.detail_scroll as isize + delta).max(0) as u16;
            }
        }
    }

    pub fn jump_to_start(&mut self) {
        self.move_selection(isize::MIN / 2);
    }

    pub fn jump_to_end(&mut self) {
        self.move_selection(isize::MAX / 2);
    }

    /// After an answer, move on to the next open decision of the same plan
    pub fn advance_to_next_open(&mut self) {
        let next = self.selected_plan().and_then(first_open);
        if next.is_some() {
            self.decisions_state.select(next);
            self.detail_scroll = 0;
        }
    }
}

/// Index of the first unanswered decision, else the first one
fn first_open(plan: &Plan) -> Option<usize> {
    plan.decisions
        .iter()
        .position(|d| d.is_open())
        .or(if plan.decisions.is_empty() { None } else { Some(0) })
}

fn border_for(state: &QueueViewState, pane: QueuePane) -> Color {
    if state.active_pane == pane {
        COLOR_FOCUS
    } else {
        COLOR_ACCENT
    }
}

fn highlight() -> Style {
    Style::default()
        .bg(COLOR_HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

pub fn draw_plans_panel(frame: &mut Frame<'_>, area: Rect, state: &mut QueueViewState) {
    let now = Utc::now();
    let title_width = area.width.saturating_sub(28) as usize;

    let items: Vec<ListItem> = state
        .plans
        .iter()
        .map(|plan| {
            let line = Line::from(vec![
                Span::styled(
                    format!("{:<7}", plan.priority.to_string()),
                    Style::default().fg(priority_color(plan.priority)),
                ),
                Span::raw(format!("{:<4} ", format_age(plan.created_at, now))),
                Span::raw(ellipsize(&plan.title, title_width.max(8))),
                Span::styled(
                    format!(" {}/{}", plan.answered, plan.total),
                    Style::default().fg(status_color(plan.status)),
                ),
            ]);
            ListItem::new(line)
        })
        .collect();

    let list = List::new(items)
        .block(themed_block(
            format!("Pending ({})", state.plans.len()),
            border_for(state, QueuePane::Plans),
        ))
        .highlight_style(highlight());

    frame.render_stateful_widget(list, area, &mut state.plans_state);
}

fn decision_icon(decision: &Decision) -> (&'static str, Style) {
    match decision.status {
        DecisionStatus::Answered => ("✓", Style::default().fg(Color::Green)),
        DecisionStatus::Skipped => ("–", Style::default().fg(Color::DarkGray)),
        DecisionStatus::Pending => ("?", Style::default().fg(Color::Yellow)),
    }
}

pub fn draw_decisions_panel(frame: &mut Frame<'_>, area: Rect, state: &mut QueueViewState) {
    let (title, items) = match state.selected_plan() {
        Some(plan) => {
            let items: Vec<ListItem> = plan
                .decisions
                .iter()
                .map(|decision| {
                    let (icon, style) = decision_icon(decision);
                    ListItem::new(Line::from(vec![
                        Span::styled(format!("{} ", icon), style),
                        Span::raw(format!("{}. ", decision.number)),
                        Span::raw(ellipsize(&decision.title, 50)),
                    ]))
                })
                .collect();
            let title = format!("{} · {} ({} open)", plan.id, plan.status, plan.remaining);
            (title, items)
        }
        None => ("Decisions".to_string(), Vec::new()),
    };

    let list = List::new(items)
        .block(themed_block(title, border_for(state, QueuePane::Decisions)))
        .highlight_style(highlight());

    frame.render_stateful_widget(list, area, &mut state.decisions_state);
}

fn bold(text: impl Into<String>) -> Line<'static> {
    Line::from(vec![Span::styled(
        text.into(),
        Style::default().add_modifier(Modifier::BOLD),
    )])
}

fn render_decision_detail(plan: &Plan, decision: &Decision, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    lines.push(bold(decision.title.clone()));
    lines.push(Line::from(format!(
        "ID: {} · Plan: {} · Agent: {}",
        decision.id, plan.id, plan.agent
    )));
    lines.push(Line::default());

    if !decision.context.is_empty() {
        for line in wrap_text(&decision.context, width) {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::default());
    }

    if !decision.options.is_empty() {
        lines.push(bold("Options:"));
        for (i, option) in decision.options.iter().enumerate() {
            let chosen = decision.answer.as_deref() == Some(option.key.as_str());
            let marker = if chosen { "●" } else { "○" };
            let style = if chosen {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let text = if option.label == option.key {
                option.key.clone()
            } else {
                format!("{} ({})", option.label, option.key)
            };
            lines.push(Line::from(vec![
                Span::styled(format!("  {} ", marker), style),
                Span::styled(format!("[{}] {}", i + 1, text), style),
            ]));
        }
    }
    if decision.allow_custom {
        lines.push(Line::styled(
            "  c: type a custom answer",
            Style::default().fg(Color::DarkGray),
        ));
    }

    match (decision.status, decision.answer.as_deref()) {
        (DecisionStatus::Answered, Some(answer)) => {
            lines.push(Line::default());
            lines.push(Line::from(vec![
                Span::styled("Answer: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(answer.to_string(), Style::default().fg(Color::Green)),
            ]));
        }
        (DecisionStatus::Skipped, _) => {
            lines.push(Line::default());
            lines.push(Line::styled("Skipped", Style::default().fg(Color::DarkGray)));
        }
        _ => {}
    }

    lines
}

pub fn draw_detail_panel(frame: &mut Frame<'_>, area: Rect, state: &QueueViewState) {
    let width = area.width.saturating_sub(6).max(20) as usize;
    let lines = match (state.selected_plan(), state.selected_decision()) {
        (Some(plan), Some(decision)) => render_decision_detail(plan, decision, width),
        (Some(plan), None) => {
            let mut lines = vec![bold(plan.title.clone())];
            for line in wrap_text(&plan.context, width) {
                lines.push(Line::from(line));
            }
            lines
        }
        _ => vec![Line::from("No pending plans")],
    };

    let paragraph = Paragraph::new(lines)
        .style(Style::default().bg(COLOR_PANEL).fg(Color::White))
        .block(themed_block("Detail", border_for(state, QueuePane::Detail)))
        .scroll((state.detail_scroll, 0))
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}

/// Plans on the left, decisions over detail on the right
pub fn draw_queue_view(frame: &mut Frame<'_>, area: Rect, state: &mut QueueViewState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(area);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(columns[1]);

    draw_plans_panel(frame, columns[0], state);
    draw_decisions_panel(frame, right[0], state);
    draw_detail_panel(frame, right[1], state);
}
