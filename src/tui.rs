use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::attachment::AttachmentKind;
use crate::db::DurableSlot;
use crate::models::{ApplicationDraft, ApplicationRecord, DocumentKind, Stage, Summary};
use crate::settings::DisplayMode;
use crate::store::RecordStore;

struct Palette {
    bg: Color,
    fg: Color,
    muted: Color,
    highlight: Color,
}

impl Palette {
    fn for_mode(mode: DisplayMode) -> Self {
        match mode {
            DisplayMode::Dark => Palette {
                bg: Color::Black,
                fg: Color::Gray,
                muted: Color::DarkGray,
                highlight: Color::Rgb(55, 65, 81),
            },
            DisplayMode::Light => Palette {
                bg: Color::White,
                fg: Color::Black,
                muted: Color::Gray,
                highlight: Color::Rgb(219, 234, 254),
            },
        }
    }
}

/// Badge colour per stage. Anything unrecognized gets the neutral grey.
pub fn stage_color(stage: &str) -> Color {
    match Stage::parse(stage) {
        Some(Stage::Applied) => Color::Blue,
        Some(Stage::PhoneScreen) => Color::Yellow,
        Some(Stage::FirstInterview) => Color::Rgb(234, 88, 12),
        Some(Stage::SecondInterview) => Color::Magenta,
        Some(Stage::FinalInterview) => Color::Rgb(79, 70, 229),
        Some(Stage::TechnicalAssessment) => Color::Cyan,
        Some(Stage::OfferReceived) => Color::Green,
        Some(Stage::Rejected) => Color::Red,
        Some(Stage::Withdrawn) | None => Color::DarkGray,
    }
}

struct AppState {
    selected: usize,
    scroll_offset: u16,
    mode: DisplayMode,
    message: Option<String>,
}

impl AppState {
    fn new(mode: DisplayMode) -> Self {
        Self {
            selected: 0,
            scroll_offset: 0,
            mode,
            message: None,
        }
    }

    fn next(&mut self, len: usize) {
        self.message = None;
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        self.message = None;
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.message = None;
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.message = None;
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

pub fn run_browse<S: DurableSlot>(store: &mut RecordStore<S>) -> Result<()> {
    if store.records().is_empty() {
        println!("No applications yet. Add one with 'jobtrack add'.");
        return Ok(());
    }

    let mut state = AppState::new(DisplayMode::load(store.slot()));

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, store);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop<S: DurableSlot>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    store: &mut RecordStore<S>,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        terminal.draw(|frame| draw(frame, state, store.records(), &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let len = store.records().len();
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(len),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('s') => {
                    state.message = Some(advance_stage(store, state.selected));
                }
                KeyCode::Char('t') => {
                    state.message = None;
                    state.mode = state.mode.toggled();
                    state.mode.save(store.slot());
                }
                _ => {}
            }
            list_state.select(Some(state.selected));
        }
    }
    Ok(())
}

/// Moves the selected record to the next stage; unknown stages restart at Applied.
fn advance_stage<S: DurableSlot>(store: &mut RecordStore<S>, selected: usize) -> String {
    let Some(record) = store.records().get(selected) else {
        return "Nothing selected".to_string();
    };
    let next = record
        .known_stage()
        .map(|s| s.next())
        .unwrap_or_default();
    let id = record.id;
    let mut draft = ApplicationDraft::from_record(record);
    draft.stage = next.as_str().to_string();
    match store.update(id, draft) {
        Ok(()) => format!("#{} moved to {}", id, next),
        Err(e) => e.to_string(),
    }
}

fn draw(frame: &mut Frame, state: &AppState, records: &[ApplicationRecord], list_state: &mut ListState) {
    let palette = Palette::for_mode(state.mode);
    let base = Style::default().bg(palette.bg).fg(palette.fg);
    frame.render_widget(Block::default().style(base), frame.area());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    // Left panel: application list
    let items: Vec<ListItem> = records
        .iter()
        .map(|record| {
            let title = if record.job_title.chars().count() > 30 {
                format!("{}...", record.job_title.chars().take(27).collect::<String>())
            } else {
                record.job_title.clone()
            };
            ListItem::new(Line::from(vec![
                Span::styled("● ", Style::default().fg(stage_color(&record.stage))),
                Span::raw(format!("{} | {}", title, record.company)),
            ]))
        })
        .collect();

    let summary = Summary::of(records);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Applications ({}) ",
            summary.total
        )))
        .style(base)
        .highlight_style(Style::default().bg(palette.highlight).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: record detail
    let detail = build_detail(records.get(state.selected), &palette);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .style(base)
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer: summary or last action, then key help
    let status = state.message.clone().unwrap_or_else(|| {
        format!(
            "In progress: {}  Offers: {}  Rejected: {}",
            summary.in_progress, summary.offers, summary.rejected
        )
    });
    let help = Paragraph::new(format!(
        " {}  |  j/k:navigate  J/K:scroll  s:next stage  t:theme  q:quit",
        status
    ))
    .style(Style::default().bg(palette.bg).fg(palette.muted));
    frame.render_widget(help, rows[1]);
}

fn build_detail<'a>(record: Option<&'a ApplicationRecord>, palette: &Palette) -> Text<'a> {
    let Some(record) = record else {
        return Text::raw("No application selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        &record.job_title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", record.company)));
    lines.push(Line::from(Span::styled(
        format!("Stage: {}", record.stage),
        Style::default().fg(stage_color(&record.stage)),
    )));
    lines.push(Line::from(format!("Applied: {}", record.applied_date)));
    lines.push(Line::from(Span::styled(
        format!("ID: {}", record.id),
        Style::default().fg(palette.muted),
    )));
    lines.push(Line::from(""));

    for kind in [DocumentKind::Resume, DocumentKind::JobDescription] {
        let text = match record.attachment(kind) {
            Some(attachment) => {
                let label = match attachment.kind() {
                    AttachmentKind::Pdf => "PDF",
                    AttachmentKind::Text => "text",
                    AttachmentKind::Other => "file",
                };
                format!(
                    "{}: {} ({}, {} bytes)",
                    kind.label(),
                    attachment.file_name,
                    label,
                    attachment.approx_size()
                )
            }
            None => format!("{}: -", kind.label()),
        };
        lines.push(Line::from(text));
    }

    if !record.offer_details.trim().is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Offer Details",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&record.offer_details, 60).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}
