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
use std::time::Duration;

use crate::actions::{self, ActionDispatcher, Sender};
use crate::gateway::Subscription;
use crate::models::{CollaborationStatus, Influencer};
use crate::report::{self, MemoryReporter};
use crate::stats::{format_followers, group_thousands};
use crate::view::{Entry, SyncState, ViewState};

const POLL: Duration = Duration::from_millis(250);

enum Mode {
    Normal,
    Search(String),
    ConfirmDelete(i64),
}

struct AppState {
    selected: usize,
    scroll_offset: u16,
    mode: Mode,
    message: Option<String>,
}

impl AppState {
    fn new() -> Self {
        Self {
            selected: 0,
            scroll_offset: 0,
            mode: Mode::Normal,
            message: None,
        }
    }

    fn current_id(&self, view: &ViewState<Influencer>) -> Option<i64> {
        view.visible().get(self.selected).map(|inf| inf.id)
    }

    fn next(&mut self, len: usize) {
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    /// Keep the cursor inside the list after it shrinks.
    fn clamp(&mut self, len: usize) {
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

fn status_for_key(c: char) -> Option<CollaborationStatus> {
    match c {
        'p' => Some(CollaborationStatus::Pending),
        'c' => Some(CollaborationStatus::Contacted),
        'i' => Some(CollaborationStatus::Interested),
        'n' => Some(CollaborationStatus::Negotiating),
        'f' => Some(CollaborationStatus::Confirmed),
        'd' => Some(CollaborationStatus::Declined),
        _ => None,
    }
}

fn status_style(status: CollaborationStatus) -> Style {
    match status {
        CollaborationStatus::Pending => Style::default().fg(Color::Gray),
        CollaborationStatus::Contacted => Style::default().fg(Color::Blue),
        CollaborationStatus::Interested => Style::default().fg(Color::Green),
        CollaborationStatus::Negotiating => Style::default().fg(Color::Yellow),
        CollaborationStatus::Confirmed => Style::default().fg(Color::Magenta),
        CollaborationStatus::Declined => Style::default().fg(Color::Red),
    }
}

/// Footer text for container events worth surfacing.
fn event_message(event: &report::Event) -> Option<String> {
    match event {
        report::Event::WriteFailed { op, id, error, .. } => Some(format!(
            "Could not {} #{}: {} (kept here)",
            op.as_str(),
            id,
            error
        )),
        report::Event::LocalOnly { id, .. } => Some(format!("#{} is demo data; change not saved", id)),
        report::Event::Orphaned { id, .. } => {
            Some(format!("#{} was saved after it was removed here", id))
        }
        report::Event::Rejected { error, .. } => Some(error.clone()),
        report::Event::Loaded { .. } | report::Event::FallbackActivated { .. } => None,
    }
}

fn sync_marker(sync: &SyncState) -> &'static str {
    match sync {
        SyncState::Synced => " ",
        SyncState::Pending => "~",
        SyncState::Unsynced(_) => "!",
        SyncState::Sample => "d",
    }
}

/// `events` must be the reporter `view` was built with.
pub async fn run_browse(
    view: &mut ViewState<Influencer>,
    events: &MemoryReporter,
    dispatcher: &dyn ActionDispatcher,
    sender: &Sender,
) -> Result<()> {
    let mut changes = view.repository().subscribe();
    let mut state = AppState::new();

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, view, events, &mut changes, dispatcher, sender).await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    view: &mut ViewState<Influencer>,
    events: &MemoryReporter,
    changes: &mut Subscription,
    dispatcher: &dyn ActionDispatcher,
    sender: &Sender,
) -> Result<()> {
    let mut list_state = ListState::default();
    let mut seen = events.events().len();

    loop {
        let recent = events.events();
        if recent.len() > seen {
            if state.message.is_none() {
                state.message = recent[seen..].iter().rev().find_map(event_message);
            }
            seen = recent.len();
        }

        state.clamp(view.visible().len());
        list_state.select(if view.visible().is_empty() { None } else { Some(state.selected) });
        terminal.draw(|frame| draw(frame, state, view, &mut list_state))?;

        if !event::poll(POLL)? {
            // Nothing typed; pick up changes made elsewhere.
            if let Ok(Some(change)) = tokio::time::timeout(Duration::ZERO, changes.next()).await {
                view.handle_change(&change).await;
            }
            continue;
        }

        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match &mut state.mode {
            Mode::Search(term) => {
                match key.code {
                    KeyCode::Enter => state.mode = Mode::Normal,
                    KeyCode::Esc => {
                        view.set_search("");
                        state.mode = Mode::Normal;
                    }
                    KeyCode::Backspace => {
                        term.pop();
                        view.set_search(term);
                    }
                    KeyCode::Char(c) => {
                        term.push(c);
                        view.set_search(term);
                    }
                    _ => {}
                }
                state.selected = 0;
                continue;
            }
            Mode::ConfirmDelete(id) => {
                let id = *id;
                state.mode = Mode::Normal;
                if key.code == KeyCode::Char('y') {
                    state.message = Some(match view.delete(id).await {
                        Ok(()) => format!("Deleted #{}", id),
                        Err(e) => format!("Removed #{} here, but the store said: {}", id, e),
                    });
                } else {
                    state.message = Some("Delete cancelled".to_string());
                }
                continue;
            }
            Mode::Normal => {}
        }

        state.message = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => state.next(view.visible().len()),
            KeyCode::Up | KeyCode::Char('k') => state.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
            KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
            KeyCode::Char('/') => state.mode = Mode::Search(view.search().to_string()),
            KeyCode::Char('s') => {
                let filter = view.status_filter().cycle(CollaborationStatus::ALL);
                view.set_status_filter(filter);
                state.selected = 0;
            }
            KeyCode::Char('r') => {
                view.load().await;
                state.message = view.warning().or_else(|| Some("Reloaded".to_string()));
            }
            KeyCode::Char('x') => {
                if let Some(id) = state.current_id(view) {
                    state.mode = Mode::ConfirmDelete(id);
                }
            }
            KeyCode::Char('e') => {
                if let Some(inf) = view.visible().get(state.selected) {
                    state.message = Some(match actions::invitation_mailto(inf, sender) {
                        Some(url) => match dispatcher.open(&url) {
                            Ok(()) => format!("Opened invitation to {}", inf.name),
                            Err(e) => format!("Could not open mail client: {}", e),
                        },
                        None => format!("No email address on file for {}", inf.name),
                    });
                }
            }
            KeyCode::Char('o') => {
                if let Some(inf) = view.visible().get(state.selected) {
                    state.message = Some(match actions::profile_url(&inf.platform, &inf.handle) {
                        Some(url) => match dispatcher.open(&url) {
                            Ok(()) => format!("Opened {}", url),
                            Err(e) => format!("Could not open browser: {}", e),
                        },
                        None => format!("No profile link for {} on {}", inf.handle, inf.platform),
                    });
                }
            }
            KeyCode::Char(c) => {
                if let (Some(status), Some(id)) = (status_for_key(c), state.current_id(view)) {
                    if let Err(e) = view.set_status(id, status).await {
                        state.message = Some(format!("Status kept locally: {}", e));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn draw(
    frame: &mut Frame,
    state: &AppState,
    view: &ViewState<Influencer>,
    list_state: &mut ListState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(if view.warning().is_some() { 4 } else { 3 }),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // Header: stats for what's on screen
    let stats = view.stats();
    let mut header = vec![Line::from(format!(
        "{} influencers  {} followers  {:.1}% avg engagement  {} active  {} pending",
        stats.total,
        format_followers(stats.total_followers),
        stats.avg_engagement,
        stats.active_collaborations,
        stats.pending,
    ))];
    if let Some(warning) = view.warning() {
        header.push(Line::from(Span::styled(
            warning,
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )));
    }
    let title = format!(
        " Influencers  filter: {}  search: {} ",
        view.status_filter(),
        if view.search().is_empty() { "-" } else { view.search() }
    );
    frame.render_widget(
        Paragraph::new(header).block(Block::default().borders(Borders::ALL).title(title)),
        rows[0],
    );

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    // Left panel: influencer list
    let entries = view.visible_entries();
    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| {
            let inf = &entry.record;
            let name = if inf.name.chars().count() > 28 {
                format!("{}...", inf.name.chars().take(25).collect::<String>())
            } else {
                inf.name.clone()
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} ", sync_marker(&entry.sync))),
                Span::raw(format!("{:<28} ", name)),
                Span::styled(
                    format!("{:<11}", inf.collaboration_status),
                    status_style(inf.collaboration_status),
                ),
                Span::raw(format!(" {:>7}", format_followers(inf.follower_count))),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " {} of {} ",
            entries.len(),
            view.len()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: detail
    let detail = match entries.get(state.selected) {
        Some(entry) => build_detail(entry),
        None if view.is_loading() => Text::raw("Loading..."),
        None => Text::raw("No influencers match"),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer
    let footer = match (&state.mode, &state.message) {
        (Mode::Search(term), _) => format!(" /{}  (enter: keep  esc: clear)", term),
        (Mode::ConfirmDelete(id), _) => format!(" Delete #{}? y to confirm, any other key cancels", id),
        (Mode::Normal, Some(message)) => format!(" {}", message),
        (Mode::Normal, None) => {
            " j/k:navigate  /:search  s:filter  p c i n f d:status  e:invite  o:profile  x:delete  r:reload  q:quit"
                .to_string()
        }
    };
    let footer_style = match state.mode {
        Mode::ConfirmDelete(_) => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::DarkGray),
    };
    frame.render_widget(Paragraph::new(footer).style(footer_style), rows[2]);
}

fn build_detail(entry: &Entry<Influencer>) -> Text<'_> {
    let inf = &entry.record;
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        inf.name.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("{} on {}", inf.handle, inf.platform)));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", inf.collaboration_status),
        status_style(inf.collaboration_status),
    )));

    match &entry.sync {
        SyncState::Synced => {}
        SyncState::Pending => lines.push(Line::from(Span::styled(
            "Saving...",
            Style::default().fg(Color::DarkGray),
        ))),
        SyncState::Unsynced(err) => lines.push(Line::from(Span::styled(
            format!("Not saved: {}", err),
            Style::default().fg(Color::Red),
        ))),
        SyncState::Sample => lines.push(Line::from(Span::styled(
            "Demo record, changes stay on this screen",
            Style::default().fg(Color::Yellow),
        ))),
    }

    lines.push(Line::from(""));
    lines.push(Line::from(format!(
        "Followers: {}   Engagement: {:.1}%",
        group_thousands(inf.follower_count),
        inf.engagement_rate
    )));

    let fields = [
        ("Niche", &inf.content_niche),
        ("Location", &inf.location),
        ("Contact", &inf.contact_info),
        ("Phone", &inf.phone),
        ("Website", &inf.website_url),
        ("Last contact", &inf.last_contact),
    ];
    for (label, value) in fields {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            lines.push(Line::from(format!("{}: {}", label, value)));
        }
    }

    if let Some(notes) = inf.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "NOTES",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(notes, 60).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}
