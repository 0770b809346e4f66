//! Watch command implementation - Interactive TUI viewer.

// CLI watch uses intentional casts for display and timing
#![allow(
    clippy::needless_pass_by_value,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use super::CliError;
use super::output::control_bar;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::collections::VecDeque;
use std::io::stdout;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use wavebattle::scenario::{Scenario, ScenarioRunner};
use wavebattle::{BattleEvent, LaneState, Side};

const LOG_LINES: usize = 200;

/// Execute the watch command.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded or the TUI fails.
pub(crate) fn execute(scenario: PathBuf, speed: u64) -> Result<(), CliError> {
    let script = Scenario::load(&scenario)?;
    // Surface roster problems before switching the terminal over.
    let runner = ScenarioRunner::new(script.clone())?;
    run_tui(script, runner, speed)
}

/// App state for the TUI.
struct App {
    script: Scenario,
    runner: ScenarioRunner,
    paused: bool,
    speed_ms: u64,
    last_step: Instant,
    log: VecDeque<String>,
    failure: Option<String>,
}

impl App {
    fn new(script: Scenario, runner: ScenarioRunner, speed_ms: u64) -> Self {
        Self {
            script,
            runner,
            paused: true, // Start paused
            speed_ms,
            last_step: Instant::now(),
            log: VecDeque::with_capacity(LOG_LINES),
            failure: None,
        }
    }

    fn is_over(&self) -> bool {
        self.runner.is_finished() || self.failure.is_some()
    }

    fn step_forward(&mut self) {
        if self.is_over() {
            return;
        }
        match self.runner.step() {
            Ok(outcome) => {
                for event in &outcome.events {
                    if let Some(line) = describe(event) {
                        if self.log.len() == LOG_LINES {
                            self.log.pop_front();
                        }
                        self.log.push_back(format!("{:>7.1}s {line}", self.runner.now() as f64 / 1000.0));
                    }
                }
            }
            Err(e) => self.failure = Some(e.to_string()),
        }
        self.last_step = Instant::now();
    }

    fn restart(&mut self) {
        match ScenarioRunner::new(self.script.clone()) {
            Ok(runner) => {
                self.runner = runner;
                self.log.clear();
                self.failure = None;
            }
            Err(e) => self.failure = Some(e.to_string()),
        }
        self.paused = true;
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    fn increase_speed(&mut self) {
        self.speed_ms = self.speed_ms.saturating_sub(50).max(10);
    }

    fn decrease_speed(&mut self) {
        self.speed_ms = (self.speed_ms + 50).min(2000);
    }

    fn should_auto_step(&self) -> bool {
        !self.paused
            && !self.is_over()
            && self.last_step.elapsed() >= Duration::from_millis(self.speed_ms)
    }
}

/// One log line per event worth showing; moves are too chatty.
fn describe(event: &BattleEvent) -> Option<String> {
    let line = match event {
        BattleEvent::Start { players, .. } => format!("battle start: {} vs {}", players[0], players[1]),
        BattleEvent::Countdown { wave, .. } => format!("wave {wave} countdown"),
        BattleEvent::DrawingStart { wave, deployment_slots, .. } => {
            format!("wave {wave} drawing ({deployment_slots} slots)")
        }
        BattleEvent::DrawingComplete { wave, early } => {
            format!("wave {wave} drawing closed{}", if *early { " early" } else { "" })
        }
        BattleEvent::Spawn { creature, .. } => format!(
            "{} spawns {} in lane {}",
            creature.owner, creature.name, creature.lane
        ),
        BattleEvent::CreatureDeath { creature, owner, lane, .. } => {
            format!("{owner} creature #{} dies in lane {lane}", creature.0)
        }
        BattleEvent::LaneCaptured { lane, player, .. } => format!("lane {lane} captured by {player}"),
        BattleEvent::End { winner, reason, .. } => match winner {
            Some(winner) => format!("{winner} wins ({reason})"),
            None => format!("draw ({reason})"),
        },
        BattleEvent::Join { .. }
        | BattleEvent::TerritoryUpdate { .. }
        | BattleEvent::CreatureMove { .. }
        | BattleEvent::CreatureAttack { .. } => return None,
    };
    Some(line)
}

fn run_tui(script: Scenario, runner: ScenarioRunner, speed: u64) -> Result<(), CliError> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| CliError::new(e.to_string()))?;

    let mut app = App::new(script, runner, speed);

    loop {
        terminal
            .draw(|f| ui(f, &app))
            .map_err(|e| CliError::new(e.to_string()))?;

        if app.should_auto_step() {
            app.step_forward();
        }

        // Handle input with timeout
        if event::poll(Duration::from_millis(20)).map_err(|e| CliError::new(e.to_string()))?
            && let Event::Key(key) = event::read().map_err(|e| CliError::new(e.to_string()))?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Char(' ') => app.toggle_pause(),
                KeyCode::Right | KeyCode::Char('l') => {
                    app.paused = true;
                    app.step_forward();
                }
                KeyCode::Char('+' | '=') => app.increase_speed(),
                KeyCode::Char('-') => app.decrease_speed(),
                KeyCode::Char('r') => app.restart(),
                _ => {}
            }
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    render_header(f, chunks[0], app);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);

    render_lanes(f, main_chunks[0], app);
    render_log(f, main_chunks[1], app);

    render_footer(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let battle = app.runner.session().battle();
    let phase = app.runner.session().phase().map_or("-", |p| p.name());

    let status = if app.failure.is_some() {
        "FAILED"
    } else if app.runner.is_finished() {
        "BATTLE OVER"
    } else if app.paused {
        "PAUSED"
    } else {
        "RUNNING"
    };

    let title = format!(
        " {} | Wave {}/{} | {} | {:.1}s | {} | Speed: {}ms ",
        app.script.name,
        battle.current_wave,
        battle.config.wave_count,
        phase,
        app.runner.now() as f64 / 1000.0,
        status,
        app.speed_ms
    );

    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn side_color(side: Side) -> Color {
    match side {
        Side::Player1 => Color::Red,
        Side::Player2 => Color::Blue,
    }
}

fn render_lanes(f: &mut Frame, area: Rect, app: &App) {
    let battle = app.runner.session().battle();
    let width = (area.width as usize).saturating_sub(24).max(10);
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{} ", battle.players[0]),
                Style::default().fg(side_color(Side::Player1)).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "{:.2}%  vs  {:.2}% ",
                battle.state.aggregate_control.player1.percent(),
                battle.state.aggregate_control.player2.percent()
            )),
            Span::styled(
                battle.players[1].to_string(),
                Style::default().fg(side_color(Side::Player2)).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
    ];

    for lane in &battle.state.lanes {
        let mut label = format!("Lane {} ", lane.lane_index);
        if let Some(owner) = lane.owner() {
            label.push_str(&format!("[{owner}]"));
        } else if lane.contested {
            label.push_str("[contested]");
        }
        lines.push(Line::from(vec![
            Span::styled(label, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!(
                " {:.1}% / {:.1}%",
                lane.player1_control.percent(),
                lane.player2_control.percent()
            )),
        ]));
        lines.push(Line::from(control_bar(
            lane.player1_control.percent(),
            lane.player2_control.percent(),
            width,
        )));
        lines.push(track(lane, width));
        lines.push(Line::from(""));
    }

    let lanes_widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Lanes "));

    f.render_widget(lanes_widget, area);
}

/// Creatures on the lane, drawn at their absolute position by element initial.
fn track(lane: &LaneState, width: usize) -> Line<'static> {
    let mut cells: Vec<Span<'static>> = vec![Span::raw(" "); width];
    for creature in lane.creatures.iter().filter(|c| c.is_alive()) {
        let column = ((creature.absolute_position() / 100.0) * (width - 1) as f64).round() as usize;
        let initial = creature
            .stats
            .element
            .to_string()
            .chars()
            .next()
            .map_or('?', |c| c.to_ascii_uppercase());
        if let Some(cell) = cells.get_mut(column.min(width - 1)) {
            *cell = Span::styled(
                initial.to_string(),
                Style::default().fg(side_color(creature.owner)),
            );
        }
    }
    let mut spans = vec![Span::raw("|")];
    spans.extend(cells);
    spans.push(Span::raw("|"));
    Line::from(spans)
}

fn render_log(f: &mut Frame, area: Rect, app: &App) {
    let visible = (area.height as usize).saturating_sub(2);
    let mut lines: Vec<Line> = Vec::with_capacity(visible);
    if let Some(failure) = &app.failure {
        lines.push(Line::from(Span::styled(
            failure.clone(),
            Style::default().fg(Color::LightRed),
        )));
    }
    let skip = app.log.len().saturating_sub(visible.saturating_sub(lines.len()));
    lines.extend(app.log.iter().skip(skip).map(|l| Line::from(l.clone())));

    let log_widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Events "))
        .wrap(Wrap { trim: false });

    f.render_widget(log_widget, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let controls = if app.is_over() {
        " [q] Quit  [r] Restart "
    } else {
        " [q] Quit  [Space] Pause  [→] Step  [+/-] Speed  [r] Restart "
    };

    let footer = Paragraph::new(controls)
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}
