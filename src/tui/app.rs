//! Main TUI application state and event loop

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::Style;
use ratatui::widgets::Block;
use ratatui::{Frame, Terminal};
use tracing::debug;

use decision_queue::{Plan, PlanStatus, QueueError, QueueManager};

use super::consumer_identity;
use super::pending_input::PendingInputs;
use super::views::{draw_queue_view, QueuePane, QueueViewState};
use super::widgets::{
    draw_command_palette, draw_confirm, draw_prompt, draw_status_bar, StatusTone, COLOR_BG,
};

const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(2);
const PAGE_JUMP: isize = 10;

/// Configuration for launching the TUI
#[derive(Clone)]
pub struct TuiConfig {
    /// Engine the adapter reads from and writes through
    pub manager: Arc<QueueManager>,

    /// How long a custom-answer prompt stays open
    pub custom_input_ttl: Duration,
}

/// Main application state
struct App {
    manager: Arc<QueueManager>,
    view: QueueViewState,

    /// Consumer identity keying the custom-input state
    identity: String,
    inputs: PendingInputs,

    /// Plan id awaiting a `y` to submit
    confirm_submit: Option<String>,

    status_message: String,
    status_tone: StatusTone,

    command_mode: bool,
    command_buffer: String,

    last_refresh: Instant,

    /// Pending 'g' for gg command
    pending_g: Option<Instant>,

    should_quit: bool,
}

impl App {
    fn new(config: TuiConfig) -> Self {
        let mut app = Self {
            manager: config.manager,
            view: QueueViewState::new(),
            identity: consumer_identity(),
            inputs: PendingInputs::new(config.custom_input_ttl),
            confirm_submit: None,
            status_message: "Press ':' for commands, 'q' to quit".to_string(),
            status_tone: StatusTone::Info,
            command_mode: false,
            command_buffer: String::new(),
            last_refresh: Instant::now(),
            pending_g: None,
            should_quit: false,
        };
        app.refresh();
        app
    }

    fn set_status<S: Into<String>>(&mut self, message: S, tone: StatusTone) {
        self.status_message = message.into();
        self.status_tone = tone;
    }

    fn refresh(&mut self) {
        self.view.set_plans(self.manager.get_pending());
        self.last_refresh = Instant::now();
    }

    fn force_refresh(&mut self) {
        match self.manager.load() {
            Ok(count) => {
                self.refresh();
                self.set_status(format!("Rescanned queue: {} plans", count), StatusTone::Success);
            }
            Err(e) => self.set_status(format!("Rescan failed: {}", e), StatusTone::Error),
        }
    }

    fn check_auto_refresh(&mut self) {
        if self.last_refresh.elapsed() >= AUTO_REFRESH_INTERVAL {
            self.refresh();
        }
    }

    fn selection(&self) -> Option<(String, String)> {
        let plan = self.view.selected_plan()?;
        let decision = self.view.selected_decision()?;
        Some((plan.id.clone(), decision.id.clone()))
    }

    /// Report a mutation outcome and resync the view
    fn after_mutation(&mut self, result: Result<Option<Plan>, QueueError>, done: &str) {
        match result {
            Ok(Some(plan)) => {
                let tone = if plan.status == PlanStatus::Ready {
                    StatusTone::Success
                } else {
                    StatusTone::Info
                };
                let suffix = if plan.status == PlanStatus::Ready {
                    " · plan ready, S to submit"
                } else {
                    ""
                };
                self.set_status(format!("{}{}", done, suffix), tone);
            }
            Ok(None) => self.set_status("Plan no longer exists", StatusTone::Warning),
            Err(e) => self.set_status(e.to_string(), StatusTone::Error),
        }
        self.refresh();
        self.view.advance_to_next_open();
    }

    fn answer_with_option(&mut self, index: usize) {
        let option = self
            .view
            .selected_decision()
            .and_then(|d| d.options.get(index))
            .map(|o| o.key.clone());
        let (Some((plan_id, decision_id)), Some(key)) = (self.selection(), option) else {
            self.set_status(format!("No option {}", index + 1), StatusTone::Warning);
            return;
        };
        let result = self.manager.answer_decision(&plan_id, &decision_id, &key);
        self.after_mutation(result, &format!("{} = {}", decision_id, key));
    }

    fn skip_selected(&mut self) {
        let Some((plan_id, decision_id)) = self.selection() else {
            return;
        };
        let result = self.manager.skip_decision(&plan_id, &decision_id);
        self.after_mutation(result, &format!("Skipped {}", decision_id));
    }

    fn begin_custom(&mut self) {
        let allowed = self.view.selected_decision().is_some_and(|d| d.allow_custom);
        let Some((plan_id, decision_id)) = self.selection() else {
            return;
        };
        if !allowed {
            self.set_status(
                format!("Decision '{}' does not accept custom answers", decision_id),
                StatusTone::Warning,
            );
            return;
        }
        self.inputs
            .begin(&self.identity, &plan_id, &decision_id, Instant::now());
        self.set_status("Type an answer, Enter to save, Esc to cancel", StatusTone::Info);
    }

    /// Route a key to the custom-answer prompt. False when none is open.
    fn handle_input_key(&mut self, key: KeyEvent) -> bool {
        let now = Instant::now();
        let Some(entry) = self.inputs.get_mut(&self.identity, now) else {
            return false;
        };
        match key.code {
            KeyCode::Esc => {
                self.inputs.cancel(&self.identity);
                self.set_status("Custom answer canceled", StatusTone::Info);
            }
            KeyCode::Backspace => {
                entry.buffer.pop();
            }
            KeyCode::Char(c) => entry.buffer.push(c),
            KeyCode::Enter => {
                if let Some(input) = self.inputs.take(&self.identity, now) {
                    let result = self.manager.answer_decision(
                        &input.plan_id,
                        &input.decision_id,
                        &input.buffer,
                    );
                    self.after_mutation(result, &format!("{} answered", input.decision_id));
                }
            }
            _ => {}
        }
        true
    }

    fn request_submit(&mut self) {
        match self.view.selected_plan() {
            Some(plan) if plan.status == PlanStatus::Ready => {
                self.confirm_submit = Some(plan.id.clone());
            }
            Some(plan) => {
                let message = format!("Plan '{}' has {} open decisions", plan.id, plan.remaining);
                self.set_status(message, StatusTone::Warning);
            }
            None => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> bool {
        let Some(plan_id) = self.confirm_submit.take() else {
            return false;
        };
        if key.code != KeyCode::Char('y') {
            self.set_status("Submit canceled", StatusTone::Info);
            return true;
        }
        match self.manager.submit_plan(&plan_id) {
            Ok(Some(_)) => self.set_status(format!("Submitted {}", plan_id), StatusTone::Success),
            Ok(None) => self.set_status("Plan no longer exists", StatusTone::Warning),
            Err(e) => self.set_status(e.to_string(), StatusTone::Error),
        }
        self.refresh();
        true
    }

    fn enter_command_mode(&mut self) {
        self.command_mode = true;
        self.command_buffer.clear();
        self.set_status(":", StatusTone::Info);
    }

    fn execute_command(&mut self, command: &str) {
        match command {
            "list" | "l" => {
                self.refresh();
                self.view.active_pane = QueuePane::Plans;
                let stats = self.manager.stats();
                self.set_status(
                    format!(
                        "{} plans · {} urgent · {} ready · {} open decisions",
                        stats.total, stats.urgent, stats.ready, stats.remaining
                    ),
                    StatusTone::Info,
                );
            }
            "refresh" | "r" => self.force_refresh(),
            "q" | "quit" => self.should_quit = true,
            _ => {
                self.set_status(format!("Unknown command: {}", command), StatusTone::Error);
            }
        }
    }

    fn handle_command_key(&mut self, key: KeyEvent) -> bool {
        if !self.command_mode {
            return false;
        }
        match key.code {
            KeyCode::Esc => {
                self.command_mode = false;
                self.command_buffer.clear();
                self.set_status("Command canceled", StatusTone::Info);
            }
            KeyCode::Enter => {
                let command = self.command_buffer.trim().to_string();
                self.command_mode = false;
                self.command_buffer.clear();
                if command.is_empty() {
                    self.set_status("Empty command", StatusTone::Info);
                } else {
                    self.execute_command(&command);
                }
            }
            KeyCode::Backspace | KeyCode::Delete => {
                self.command_buffer.pop();
            }
            KeyCode::Char(c) => {
                self.command_buffer.push(c);
            }
            _ => {}
        }
        true
    }

    fn handle_lower_g(&mut self) {
        let now = Instant::now();
        match self.pending_g.take() {
            Some(prev) if now.duration_since(prev) <= Duration::from_millis(800) => {
                self.view.jump_to_start();
                self.set_status("Jumped to top (gg)", StatusTone::Info);
            }
            _ => {
                self.pending_g = Some(now);
                self.set_status("Press g again to jump to top", StatusTone::Info);
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.handle_confirm_key(key)
            || self.handle_input_key(key)
            || self.handle_command_key(key)
        {
            return;
        }

        if !matches!(key.code, KeyCode::Char('g')) {
            self.pending_g = None;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(':') => self.enter_command_mode(),
            KeyCode::Char('g') => self.handle_lower_g(),
            KeyCode::Char('G') => self.view.jump_to_end(),
            KeyCode::Char('r') => self.force_refresh(),

            KeyCode::Tab => self.view.cycle_pane(),
            KeyCode::Down | KeyCode::Char('j') => self.view.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.view.move_selection(-1),
            KeyCode::PageDown => self.view.move_selection(PAGE_JUMP),
            KeyCode::PageUp => self.view.move_selection(-PAGE_JUMP),

            KeyCode::Char(c @ '1'..='9') => self.answer_with_option((c as u8 - b'1') as usize),
            KeyCode::Char('s') => self.skip_selected(),
            KeyCode::Char('c') => self.begin_custom(),
            KeyCode::Char('S') => self.request_submit(),
            _ => {}
        }
    }

    fn state_line(&self) -> String {
        let stats = self.manager.stats();
        let mut line = format!(
            "Plans: {} · Ready: {} · Open: {} · Consumer: {}",
            stats.total, stats.ready, stats.remaining, self.identity
        );
        if stats.malformed > 0 {
            line.push_str(&format!(" · Malformed: {}", stats.malformed));
        }
        line
    }

    fn help_line(&self) -> &'static str {
        "Keys: Tab pane · j/k nav · 1-9 answer · s skip · c custom · S submit · r refresh · : cmd · q quit"
    }
}

/// Run the TUI until the user quits. Blocks the calling thread.
pub fn run_tui(config: TuiConfig) -> Result<()> {
    let mut app = App::new(config);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_event_loop(&mut terminal, &mut app);

    cleanup_terminal(terminal)?;
    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> Result<()> {
    while !app.should_quit {
        app.check_auto_refresh();

        terminal.draw(|frame| draw_ui(frame, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                app.handle_key(key);
            }
        }
    }

    debug!("TUI event loop finished");
    Ok(())
}

fn draw_ui(frame: &mut Frame<'_>, app: &mut App) {
    frame.render_widget(
        Block::default().style(Style::default().bg(COLOR_BG)),
        frame.size(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(10), Constraint::Length(5)].as_ref())
        .split(frame.size());

    draw_queue_view(frame, chunks[0], &mut app.view);

    draw_status_bar(
        frame,
        chunks[1],
        &app.status_message,
        app.status_tone,
        &app.state_line(),
        app.help_line(),
    );

    let now = Instant::now();
    if let Some(input) = app.inputs.peek(&app.identity, now) {
        let secs = app
            .inputs
            .remaining(&app.identity, now)
            .map_or(0, |d| d.as_secs());
        let title = format!("Custom answer for {} ({}s)", input.decision_id, secs);
        draw_prompt(frame, frame.size(), &title, &input.buffer);
    } else if app.command_mode {
        draw_command_palette(frame, frame.size(), &app.command_buffer);
    }

    if let Some(plan_id) = &app.confirm_submit {
        draw_confirm(frame, frame.size(), &format!("Submit plan '{}'?", plan_id));
    }
}

fn cleanup_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
