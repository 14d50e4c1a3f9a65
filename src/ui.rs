use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use crate::controller::{Controller, Load, UiState};
use crate::session::Status;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const ANSWER_SCROLL_STEP: u16 = 5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pane {
    Episodes,
    Suggestions,
    Input,
    Answer,
}

impl Pane {
    const ORDER: [Pane; 4] = [Pane::Episodes, Pane::Suggestions, Pane::Input, Pane::Answer];

    fn next(self) -> Self {
        let idx = Self::ORDER.iter().position(|pane| *pane == self).unwrap_or(0);
        Self::ORDER[(idx + 1) % Self::ORDER.len()]
    }

    fn previous(self) -> Self {
        let idx = Self::ORDER.iter().position(|pane| *pane == self).unwrap_or(0);
        Self::ORDER[(idx + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }

    fn title(self) -> &'static str {
        match self {
            Pane::Episodes => "Episodes",
            Pane::Suggestions => "Suggested questions",
            Pane::Input => "Ask",
            Pane::Answer => "Answer",
        }
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Options {
    pub config_path: String,
}

pub struct Model {
    controller: Controller,
    focused_pane: Pane,
    input: String,
    episode_cursor: usize,
    answer_scroll: u16,
    needs_redraw: bool,
    spinner: Spinner,
    config_path: String,
}

impl Model {
    pub fn new(controller: Controller, options: Options) -> Self {
        Self {
            controller,
            focused_pane: Pane::Episodes,
            input: String::new(),
            episode_cursor: 0,
            answer_scroll: 0,
            needs_redraw: true,
            spinner: Spinner::new(),
            config_path: options.config_path,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.controller.load_catalog();
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.controller.poll() {
                self.sync_cursor();
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        if self.handle_key(key)? {
                            break;
                        }
                        self.mark_dirty();
                    }
                } else {
                    self.mark_dirty();
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.controller.state().is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn sync_cursor(&mut self) {
        let count = self.controller.state().episode_list().len();
        if count == 0 {
            self.episode_cursor = 0;
        } else if self.episode_cursor >= count {
            self.episode_cursor = count - 1;
        }
    }

    /// Returns `Ok(true)` when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }
        if self.focused_pane == Pane::Input {
            self.handle_input_key(key.code);
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Tab => self.focused_pane = self.focused_pane.next(),
            KeyCode::BackTab => self.focused_pane = self.focused_pane.previous(),
            KeyCode::Char('/') | KeyCode::Char('i') => self.focused_pane = Pane::Input,
            KeyCode::Char('m') => self.controller.cycle_mode(),
            KeyCode::Char('x') => self.controller.cancel_answer(),
            KeyCode::Char('r') => {
                self.episode_cursor = 0;
                self.controller.load_catalog();
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1),
            KeyCode::PageDown => {
                self.answer_scroll = self.answer_scroll.saturating_add(ANSWER_SCROLL_STEP);
            }
            KeyCode::PageUp => {
                self.answer_scroll = self.answer_scroll.saturating_sub(ANSWER_SCROLL_STEP);
            }
            KeyCode::Enter => match self.focused_pane {
                Pane::Episodes => {
                    if !self.controller.state().episode_list().is_empty() {
                        self.controller.select_episode(self.episode_cursor);
                        self.answer_scroll = 0;
                    }
                }
                Pane::Suggestions => {
                    if self.controller.activate_selected_suggestion().is_ok() {
                        self.answer_scroll = 0;
                        self.focused_pane = Pane::Answer;
                    }
                }
                Pane::Input | Pane::Answer => {}
            },
            _ => {}
        }
        Ok(false)
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.focused_pane = Pane::Suggestions,
            KeyCode::Tab => self.focused_pane = self.focused_pane.next(),
            KeyCode::BackTab => self.focused_pane = self.focused_pane.previous(),
            KeyCode::Enter => {
                if self.controller.submit_question(&self.input).is_ok() {
                    self.input.clear();
                    self.answer_scroll = 0;
                    self.focused_pane = Pane::Answer;
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) => self.input.push(ch),
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.focused_pane {
            Pane::Episodes => {
                let count = self.controller.state().episode_list().len();
                if count > 0 {
                    self.episode_cursor = self
                        .episode_cursor
                        .saturating_add_signed(delta)
                        .min(count - 1);
                }
            }
            Pane::Suggestions => self.controller.move_suggestion(delta),
            Pane::Answer => {
                self.answer_scroll = if delta > 0 {
                    self.answer_scroll.saturating_add(1)
                } else {
                    self.answer_scroll.saturating_sub(1)
                };
            }
            Pane::Input => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);
        let state = self.controller.state();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if state.is_loading() {
            format!("{} {}", self.spinner.frame(), state.status_message)
        } else {
            state.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(layout[1]);

        let suggestion_rows = state.suggestions.questions().len().clamp(1, 6) as u16 + 2;
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(7),
                Constraint::Length(suggestion_rows),
                Constraint::Length(3),
                Constraint::Min(0),
            ])
            .split(columns[1]);

        let focus = self.focused_pane;
        draw_episodes(frame, columns[0], state, self.episode_cursor, focus == Pane::Episodes);
        draw_summary(frame, right[0], state);
        draw_suggestions(frame, right[1], state, focus == Pane::Suggestions);
        draw_input(frame, right[2], state, &self.input, focus == Pane::Input);
        draw_answer(frame, right[3], state, self.answer_scroll, focus == Pane::Answer);

        let footer = Paragraph::new(footer_text(focus, &self.config_path))
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[2]);
    }
}

fn footer_text(focus: Pane, config_path: &str) -> String {
    match focus {
        Pane::Input => "Enter: ask · Esc: leave input · Tab: next pane · Ctrl-C: quit".to_string(),
        _ => format!(
            "Tab: pane · j/k: move · Enter: select · /: ask · m: mode · x: stop · r: reload · q: quit · config {config_path}"
        ),
    }
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border_style = if focused {
        Style::default().fg(COLOR_BORDER_FOCUSED)
    } else {
        Style::default().fg(COLOR_BORDER_IDLE)
    };
    let title_style = if focused {
        Style::default()
            .fg(COLOR_ACCENT)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(COLOR_TEXT_SECONDARY)
    };
    Block::default()
        .title(Span::styled(title, title_style))
        .borders(Borders::ALL)
        .border_style(border_style)
        .style(Style::default().bg(COLOR_PANEL_BG))
        .padding(Padding::horizontal(1))
}

fn placeholder(text: &str, color: Color) -> Paragraph<'static> {
    Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: true })
}

fn draw_episodes(frame: &mut Frame<'_>, area: Rect, state: &UiState, cursor: usize, focused: bool) {
    let block = pane_block(Pane::Episodes.title().to_string(), focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let episodes = match &state.episodes {
        Load::Empty => {
            frame.render_widget(placeholder("No episodes.", COLOR_TEXT_SECONDARY), inner);
            return;
        }
        Load::Loading => {
            frame.render_widget(placeholder("Loading episodes…", COLOR_TEXT_SECONDARY), inner);
            return;
        }
        Load::Failed(message) => {
            frame.render_widget(placeholder(message, COLOR_ERROR), inner);
            return;
        }
        Load::Ready(episodes) if episodes.is_empty() => {
            frame.render_widget(placeholder("No episodes.", COLOR_TEXT_SECONDARY), inner);
            return;
        }
        Load::Ready(episodes) => episodes,
    };

    let items: Vec<ListItem> = episodes
        .iter()
        .enumerate()
        .map(|(idx, episode)| {
            let style = if state.selected_episode == Some(idx) {
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            ListItem::new(Line::from(Span::styled(episode.label(), style)))
        })
        .collect();
    let list = List::new(items)
        .highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG))
        .highlight_symbol("▌");
    let mut list_state = ListState::default().with_selected(Some(cursor));
    frame.render_stateful_widget(list, inner, &mut list_state);
}

fn draw_summary(frame: &mut Frame<'_>, area: Rect, state: &UiState) {
    let title = match state.current_episode() {
        Some(episode) => episode.label(),
        None => "Summary".to_string(),
    };
    let block = pane_block(title, false);
    let paragraph = match &state.summary {
        Load::Empty => placeholder("", COLOR_TEXT_SECONDARY),
        Load::Loading => placeholder("Loading summary…", COLOR_TEXT_SECONDARY),
        Load::Failed(message) => placeholder(message, COLOR_ERROR),
        Load::Ready(summary) => placeholder(summary, COLOR_TEXT_PRIMARY),
    };
    frame.render_widget(paragraph.block(block), area);
}

fn draw_suggestions(frame: &mut Frame<'_>, area: Rect, state: &UiState, focused: bool) {
    let block = pane_block(Pane::Suggestions.title().to_string(), focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if state.suggestions.is_empty() {
        frame.render_widget(placeholder("No suggestions.", COLOR_TEXT_SECONDARY), inner);
        return;
    }
    let items: Vec<ListItem> = state
        .suggestions
        .questions()
        .iter()
        .map(|question| ListItem::new(Line::from(Span::raw(question.clone()))))
        .collect();
    let list = List::new(items)
        .style(Style::default().fg(COLOR_TEXT_PRIMARY))
        .highlight_style(if focused {
            Style::default().bg(COLOR_PANEL_SELECTED_BG).fg(COLOR_ACCENT)
        } else {
            Style::default()
        })
        .highlight_symbol("? ");
    let mut list_state = ListState::default().with_selected(Some(state.suggestions.selected()));
    frame.render_stateful_widget(list, inner, &mut list_state);
}

fn draw_input(frame: &mut Frame<'_>, area: Rect, state: &UiState, input: &str, focused: bool) {
    let title = format!("{} · mode: {}", Pane::Input.title(), state.mode.current());
    let block = pane_block(title, focused);
    let inner = block.inner(area);
    let paragraph = if input.is_empty() && !focused {
        placeholder("Press / to type a question", COLOR_TEXT_SECONDARY)
    } else {
        placeholder(input, COLOR_TEXT_PRIMARY)
    };
    frame.render_widget(paragraph.block(block), area);

    if focused {
        let offset = UnicodeWidthStr::width(input).min(inner.width.saturating_sub(1) as usize);
        frame.set_cursor(inner.x + offset as u16, inner.y);
    }
}

fn draw_answer(frame: &mut Frame<'_>, area: Rect, state: &UiState, scroll: u16, focused: bool) {
    let status = state.answer_status();
    let title = match state.sessions.current() {
        Some(session) => format!(
            "{} · {} · {}",
            Pane::Answer.title(),
            session.mode(),
            status.label()
        ),
        None => Pane::Answer.title().to_string(),
    };
    let block = pane_block(title, focused);
    let paragraph = Paragraph::new(answer_text(state))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn answer_text(state: &UiState) -> Text<'static> {
    let Some(session) = state.sessions.current() else {
        return Text::from(Line::from(Span::styled(
            "Pick a suggested question or type your own.",
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Q: ", Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)),
            Span::styled(
                session.question().to_string(),
                Style::default().fg(COLOR_TEXT_PRIMARY).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::default(),
    ];
    lines.extend(state.answer.lines.iter().cloned());
    match session.status() {
        Status::Errored => {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                format!("Answer failed: {}", session.error().unwrap_or("unknown error")),
                Style::default().fg(COLOR_ERROR),
            )));
        }
        Status::Completed => {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "✓ done",
                Style::default().fg(COLOR_SUCCESS),
            )));
        }
        Status::Idle | Status::Streaming => {}
    }
    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::controller::Services;
    use crate::data::mock::{MockAnswerService, MockCatalogService, MockDetailService};
    use crate::markdown::plain_lines;
    use crate::mode::ModeSelector;

    fn model() -> Model {
        let services = Services {
            catalog: Arc::new(MockCatalogService::default()),
            details: Arc::new(MockDetailService {
                bodies: HashMap::new(),
            }),
            answers: Arc::new(MockAnswerService::default()),
        };
        let controller = Controller::new(UiState::new("1", ModeSelector::default()), services);
        Model::new(
            controller,
            Options {
                config_path: "~/.config/podqa/config.yaml".into(),
            },
        )
    }

    fn press(model: &mut Model, code: KeyCode) -> bool {
        model
            .handle_key(KeyEvent::new(code, KeyModifiers::NONE))
            .unwrap()
    }

    #[test]
    fn pane_cycle_wraps_both_ways() {
        assert_eq!(Pane::Answer.next(), Pane::Episodes);
        assert_eq!(Pane::Episodes.previous(), Pane::Answer);
    }

    #[test]
    fn q_quits_outside_input_but_types_inside() {
        let mut model = model();
        assert!(!press(&mut model, KeyCode::Char('/')));
        assert_eq!(model.focused_pane, Pane::Input);
        assert!(!press(&mut model, KeyCode::Char('q')));
        assert_eq!(model.input, "q");
        press(&mut model, KeyCode::Esc);
        assert!(press(&mut model, KeyCode::Char('q')));
    }

    #[test]
    fn ctrl_c_always_quits() {
        let mut model = model();
        press(&mut model, KeyCode::Char('i'));
        let quit = model
            .handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
            .unwrap();
        assert!(quit);
    }

    #[test]
    fn submitting_without_episode_keeps_input() {
        let mut model = model();
        press(&mut model, KeyCode::Char('/'));
        for ch in "Why?".chars() {
            press(&mut model, KeyCode::Char(ch));
        }
        press(&mut model, KeyCode::Enter);
        assert_eq!(model.input, "Why?");
        assert_eq!(model.focused_pane, Pane::Input);
        assert_eq!(
            model.controller.state().status_message,
            "Select an episode before asking."
        );
    }

    #[test]
    fn mode_key_cycles_mode() {
        let mut model = model();
        press(&mut model, KeyCode::Char('m'));
        assert_eq!(model.controller.state().mode.current().as_str(), "fulltext");
    }

    #[test]
    fn answer_placeholder_without_session() {
        let model = model();
        let lines = plain_lines(&answer_text(model.controller.state()));
        assert_eq!(lines, vec!["Pick a suggested question or type your own."]);
    }

    #[test]
    fn footer_mentions_config_path() {
        assert!(footer_text(Pane::Episodes, "~/cfg.yaml").contains("~/cfg.yaml"));
        assert!(footer_text(Pane::Input, "~/cfg.yaml").contains("Esc"));
    }
}
