use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::UnicodeWidthStr;

use crate::backend::{Comment, Post};
use crate::comment::{CommentSubmitter, SubmitError};
use crate::feed::{flatten, FeedError, FeedStore, Row};
use crate::session;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const COMMENT_INDENT: &str = "  ";
const ADD_COMMENT_PLACEHOLDER: &str = "Add a comment...";

pub struct Options {
    pub status_message: String,
    pub feed: Arc<FeedStore>,
    pub submitter: Arc<CommentSubmitter>,
    pub session: Arc<session::Manager>,
    pub fetch_on_start: bool,
}

/// Owned mirror of one flattened row, addressing into the snapshot by
/// section and comment index so selection survives redraws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Header,
    Comment(usize),
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRow {
    pub section: usize,
    pub kind: RowKind,
}

/// Flattens every section of the snapshot into a single selectable list,
/// one entry per rendered row.
pub fn layout_rows(posts: &[Post]) -> Vec<DisplayRow> {
    let mut rows = Vec::new();
    for (section, post) in posts.iter().enumerate() {
        let mut comment_index = 0;
        for row in flatten(post) {
            let kind = match row {
                Row::PostHeader(_) => RowKind::Header,
                Row::Comment(_, _) => {
                    let kind = RowKind::Comment(comment_index);
                    comment_index += 1;
                    kind
                }
                Row::AddCommentPrompt(_) => RowKind::Prompt,
            };
            rows.push(DisplayRow { section, kind });
        }
    }
    rows
}

enum UiEvent {
    Refreshed(Result<Vec<Post>, FeedError>),
    Submitted(Result<Comment, SubmitError>),
}

enum StatusTone {
    Info,
    Success,
    Error,
}

struct Compose {
    post: Post,
    buffer: String,
}

pub struct Model {
    feed: Arc<FeedStore>,
    submitter: Arc<CommentSubmitter>,
    session: Arc<session::Manager>,
    snapshot: Vec<Post>,
    selected: usize,
    compose: Option<Compose>,
    status: String,
    tone: StatusTone,
    refresh_in_flight: bool,
    fetch_on_start: bool,
    events_tx: Sender<UiEvent>,
    events_rx: Receiver<UiEvent>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            feed: options.feed,
            submitter: options.submitter,
            session: options.session,
            snapshot: Vec::new(),
            selected: 0,
            compose: None,
            status: options.status_message,
            tone: StatusTone::Info,
            refresh_in_flight: false,
            fetch_on_start: options.fetch_on_start,
            events_tx,
            events_rx,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        stdout
            .execute(EnterAlternateScreen)
            .context("enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("create terminal")?;

        if self.fetch_on_start {
            self.spawn_refresh();
        }

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        terminal.backend_mut().execute(LeaveAlternateScreen).ok();
        terminal.show_cursor().ok();
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            while let Ok(event) = self.events_rx.try_recv() {
                self.apply_event(event);
            }

            terminal.draw(|frame| self.draw(frame))?;

            if !event::poll(POLL_INTERVAL).context("poll terminal events")? {
                continue;
            }
            if let Event::Key(key) = event::read().context("read terminal event")? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if self.compose.is_some() {
                    self.handle_compose_key(key.code);
                } else if self.handle_browse_key(key.code) {
                    return Ok(());
                }
            }
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Refreshed(Ok(posts)) => {
                self.refresh_in_flight = false;
                self.snapshot = posts;
                self.clamp_selection();
                self.set_status(
                    format!("Loaded {} posts.", self.snapshot.len()),
                    StatusTone::Success,
                );
            }
            UiEvent::Refreshed(Err(err)) => {
                // Stale snapshot stays on screen; only the status changes.
                self.refresh_in_flight = false;
                self.set_status(format!("{err}"), StatusTone::Error);
            }
            UiEvent::Submitted(Ok(comment)) => {
                self.snapshot = self.feed.posts();
                self.clamp_selection();
                self.set_status(
                    format!("Comment posted as {}.", comment.author),
                    StatusTone::Success,
                );
            }
            UiEvent::Submitted(Err(err)) => {
                // A remote failure leaves the optimistic entry in the
                // snapshot, so re-read it either way.
                self.snapshot = self.feed.posts();
                self.clamp_selection();
                self.set_status(format!("{err}"), StatusTone::Error);
            }
        }
    }

    fn handle_browse_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('r') => self.spawn_refresh(),
            KeyCode::Enter => self.activate_selection(),
            _ => {}
        }
        false
    }

    fn handle_compose_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.compose = None;
                self.set_status("Comment discarded.".to_string(), StatusTone::Info);
            }
            KeyCode::Enter => self.send_comment(),
            KeyCode::Backspace => {
                if let Some(compose) = self.compose.as_mut() {
                    compose.buffer.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(compose) = self.compose.as_mut() {
                    compose.buffer.push(c);
                }
            }
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: i64) {
        let rows = layout_rows(&self.snapshot);
        if rows.is_empty() {
            self.selected = 0;
            return;
        }
        let last = rows.len() as i64 - 1;
        let next = (self.selected as i64 + delta).clamp(0, last);
        self.selected = next as usize;
    }

    fn clamp_selection(&mut self) {
        let total = layout_rows(&self.snapshot).len();
        if total == 0 {
            self.selected = 0;
        } else if self.selected >= total {
            self.selected = total - 1;
        }
    }

    fn activate_selection(&mut self) {
        let rows = layout_rows(&self.snapshot);
        let Some(row) = rows.get(self.selected) else {
            return;
        };
        if row.kind != RowKind::Prompt {
            return;
        }
        let Some(post) = self.snapshot.get(row.section).cloned() else {
            return;
        };
        if self.session.current().is_none() {
            self.set_status(
                "Not logged in. Set session.handle in the config to comment.".to_string(),
                StatusTone::Error,
            );
            return;
        }
        self.compose = Some(Compose {
            post,
            buffer: String::new(),
        });
        self.set_status(
            "Composing. Enter sends, Esc discards.".to_string(),
            StatusTone::Info,
        );
    }

    fn spawn_refresh(&mut self) {
        if self.refresh_in_flight {
            return;
        }
        self.refresh_in_flight = true;
        self.set_status("Refreshing feed...".to_string(), StatusTone::Info);
        let feed = self.feed.clone();
        let tx = self.events_tx.clone();
        thread::spawn(move || {
            let result = feed.refresh();
            let _ = tx.send(UiEvent::Refreshed(result));
        });
    }

    fn send_comment(&mut self) {
        let Some(compose) = self.compose.take() else {
            return;
        };
        let author = match self.session.handle() {
            Ok(handle) => handle,
            Err(err) => {
                self.set_status(format!("{err}"), StatusTone::Error);
                return;
            }
        };
        self.set_status("Posting comment...".to_string(), StatusTone::Info);
        let submitter = self.submitter.clone();
        let tx = self.events_tx.clone();
        thread::spawn(move || {
            let result = submitter.submit(&compose.post, &author, &compose.buffer);
            let _ = tx.send(UiEvent::Submitted(result));
        });
    }

    fn set_status(&mut self, message: String, tone: StatusTone) {
        self.status = message;
        self.tone = tone;
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let input_height = if self.compose.is_some() { 3 } else { 0 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(input_height),
            ])
            .split(frame.size());

        self.draw_feed(frame, chunks[0]);
        self.draw_status(frame, chunks[1]);
        if self.compose.is_some() {
            self.draw_input(frame, chunks[2]);
        }
    }

    fn draw_feed(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let inner_width = area.width.saturating_sub(2) as usize;
        let rows = layout_rows(&self.snapshot);
        let items: Vec<ListItem> = rows
            .iter()
            .filter_map(|row| {
                let post = self.snapshot.get(row.section)?;
                Some(ListItem::new(row_lines(post, row.kind, inner_width)))
            })
            .collect();

        let items = if items.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "Feed is empty. Press r to refresh.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )))]
        } else {
            items
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Feed ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(COLOR_BORDER_IDLE))
                    .style(Style::default().bg(COLOR_BG)),
            )
            .highlight_style(Style::default().bg(COLOR_SELECTED_BG));

        let mut state = ListState::default();
        if !rows.is_empty() {
            state.select(Some(self.selected.min(rows.len() - 1)));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let color = match self.tone {
            StatusTone::Info => COLOR_TEXT_SECONDARY,
            StatusTone::Success => COLOR_SUCCESS,
            StatusTone::Error => COLOR_ERROR,
        };
        let status = Paragraph::new(Line::from(Span::styled(
            self.status.clone(),
            Style::default().fg(color),
        )))
        .style(Style::default().bg(COLOR_BG));
        frame.render_widget(status, area);
    }

    fn draw_input(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some(compose) = self.compose.as_ref() else {
            return;
        };
        let author = self
            .session
            .current()
            .map(|account| account.handle)
            .unwrap_or_default();
        let (text, style) = if compose.buffer.is_empty() {
            (
                ADD_COMMENT_PLACEHOLDER.to_string(),
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .add_modifier(Modifier::ITALIC),
            )
        } else {
            (
                compose.buffer.clone(),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )
        };
        let input = Paragraph::new(Line::from(Span::styled(text, style))).block(
            Block::default()
                .title(format!(" Comment as {author} "))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_ACCENT))
                .style(Style::default().bg(COLOR_BG)),
        );
        frame.render_widget(input, area);
    }
}

fn row_lines(post: &Post, kind: RowKind, width: usize) -> Vec<Line<'static>> {
    match kind {
        RowKind::Header => header_lines(post, width),
        RowKind::Comment(index) => match post.comments.get(index) {
            Some(comment) => comment_lines(comment, width),
            None => Vec::new(),
        },
        RowKind::Prompt => vec![Line::from(Span::styled(
            format!("{COMMENT_INDENT}{ADD_COMMENT_PLACEHOLDER}"),
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::ITALIC),
        ))],
    }
}

fn header_lines(post: &Post, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        post.author.clone(),
        Style::default()
            .fg(COLOR_ACCENT)
            .add_modifier(Modifier::BOLD),
    ))];
    lines.push(Line::from(Span::styled(
        image_label(&post.image_url),
        Style::default().fg(COLOR_TEXT_SECONDARY),
    )));
    if let Some(caption) = post.caption.as_deref() {
        for wrapped in wrap(caption, width.max(1)) {
            lines.push(Line::from(Span::styled(
                wrapped.into_owned(),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )));
        }
    }
    lines
}

fn comment_lines(comment: &Comment, width: usize) -> Vec<Line<'static>> {
    let body_width = width.saturating_sub(display_width(COMMENT_INDENT)).max(1);
    let mut lines = Vec::new();
    let mut first = true;
    for wrapped in wrap(&comment.text, body_width) {
        if first {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("{COMMENT_INDENT}{} ", comment.author),
                    Style::default().fg(COLOR_ACCENT),
                ),
                Span::styled(
                    wrapped.into_owned(),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                ),
            ]));
            first = false;
        } else {
            lines.push(Line::from(Span::styled(
                format!("{COMMENT_INDENT}{}", wrapped),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )));
        }
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{COMMENT_INDENT}{}", comment.author),
            Style::default().fg(COLOR_ACCENT),
        )));
    }
    lines
}

/// Placeholder shown for the opaque image reference; pixels are resolved by
/// an external viewer, never here.
fn image_label(url: &str) -> String {
    if url.is_empty() {
        "[image unavailable]".to_string()
    } else {
        format!("[image: {url}]")
    }
}

fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}
