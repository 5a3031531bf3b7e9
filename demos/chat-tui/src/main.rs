//! Terminal chat client for MoodMorph.
//!
//! Run with: cargo run -p chat-tui
//!
//! Reads `<config dir>/moodmorph/config.json` if present. `MOODMORPH_URL`
//! overrides the backend address. Logs go to `<data dir>/moodmorph/chat-tui.log`.

use std::{fs, io, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use moodmorph_core::{
    InputMeter, KeyValueStore, LogEvent, Message, MessageBody, MessageKind, Role, SessionConfig,
};
use moodmorph_responder::{HttpResponder, ResponderConfig};
use moodmorph_session::{
    MediaRefresh, Persistence, SessionManager,
    storage::{FileStore, MemoryStore},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Manager = SessionManager<HttpResponder, Arc<dyn KeyValueStore>>;

/// Contents of `config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppConfig {
    session: SessionConfig,
    responder: ResponderConfig,
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("moodmorph").join("config.json"))
}

fn load_config() -> anyhow::Result<AppConfig> {
    let mut config = match config_path() {
        Some(path) if path.exists() => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        _ => AppConfig::default(),
    };
    if let Ok(url) = std::env::var("MOODMORPH_URL") {
        config.responder.base_url = url;
    }
    Ok(config)
}

fn init_logging() {
    let Some(dir) = dirs::data_dir().map(|d| d.join("moodmorph")) else {
        return;
    };
    let Ok(file) = fs::create_dir_all(&dir).and_then(|()| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("chat-tui.log"))
    }) else {
        return;
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn open_store() -> Arc<dyn KeyValueStore> {
    FileStore::default_location().map_or_else(
        || {
            tracing::warn!("no data directory, history will not survive restarts");
            Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>
        },
        |store| Arc::new(store) as Arc<dyn KeyValueStore>,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = load_config()?;

    let responder = HttpResponder::new(config.responder)?;
    let manager: Arc<Manager> =
        Arc::new(SessionManager::new(responder, open_store(), config.session));
    tracing::info!(session_id = %manager.session_id(), "starting chat");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, manager).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

struct App {
    messages: Vec<Message>,
    input: String,
    scroll: u16,
    follow: bool,
    busy: bool,
    notice: Option<String>,
    memory_only: bool,
    greeting: Option<String>,
    max_input_chars: usize,
}

impl App {
    fn new(manager: &Manager, initial: Vec<Message>) -> Self {
        let view = manager.view();
        Self {
            messages: initial,
            input: String::new(),
            scroll: 0,
            follow: true,
            busy: view.busy,
            notice: None,
            memory_only: manager.persistence() == Persistence::MemoryOnly,
            greeting: view.greeting,
            max_input_chars: manager.config().max_input_chars,
        }
    }

    fn apply(&mut self, event: LogEvent, manager: &Manager) {
        match event {
            LogEvent::Appended(msg) => self.messages.push(msg),
            LogEvent::Evicted(id) => self.messages.retain(|m| m.id() != id),
            LogEvent::MediaReplaced { .. } | LogEvent::Restored { .. } => {
                self.messages = manager.snapshot();
            }
            LogEvent::Cleared => self.messages.clear(),
        }
        self.greeting = manager.view().greeting;
    }

    fn meter(&self) -> InputMeter {
        InputMeter::for_len(self.input.chars().count(), self.max_input_chars)
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    manager: Arc<Manager>,
) -> anyhow::Result<()> {
    let initial = manager.rehydrate();
    let mut events = manager.subscribe();
    let mut app = App::new(&manager, initial);

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<String>();

    loop {
        loop {
            match events.try_recv() {
                Ok(event) => app.apply(event, &manager),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "render lagged, resyncing");
                    app.messages = manager.snapshot();
                }
                Err(_) => break,
            }
        }
        while let Ok(notice) = notice_rx.try_recv() {
            app.notice = Some(notice);
        }
        app.busy = manager.is_busy();
        app.memory_only = manager.persistence() == Persistence::MemoryOnly;

        terminal.draw(|f| ui(f, &mut app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => return Ok(()),
            KeyEvent {
                code: KeyCode::Char('k'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                manager.reset();
                app.notice = Some("Conversation cleared".to_string());
            }
            KeyEvent {
                code: KeyCode::Char('g'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => request_gif(&manager, &notice_tx),
            KeyEvent {
                code: KeyCode::Char('r'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => show_history(&manager, &notice_tx),
            KeyEvent {
                code: KeyCode::Esc, ..
            } => {
                if manager.cancel_pending() {
                    app.notice = Some("Stopped waiting for a reply".to_string());
                }
            }
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } => app.input.push(c),
            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => {
                app.input.pop();
            }
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => {
                let text = app.input.clone();
                // Input is kept on rejection so nothing typed is lost.
                if let Err(e) = moodmorph_core::validate_input(&text, app.max_input_chars) {
                    app.notice = Some(e.to_string());
                } else if app.busy {
                    app.notice = Some("Please wait for the current reply".to_string());
                } else {
                    app.input.clear();
                    app.notice = None;
                    app.follow = true;
                    submit(&manager, text, &notice_tx);
                }
            }
            KeyEvent {
                code: KeyCode::Up, ..
            } => {
                app.follow = false;
                app.scroll = app.scroll.saturating_sub(1);
            }
            KeyEvent {
                code: KeyCode::Down,
                ..
            } => app.scroll = app.scroll.saturating_add(1),
            KeyEvent {
                code: KeyCode::PageUp,
                ..
            } => {
                app.follow = false;
                app.scroll = app.scroll.saturating_sub(10);
            }
            KeyEvent {
                code: KeyCode::PageDown,
                ..
            } => app.scroll = app.scroll.saturating_add(10),
            KeyEvent {
                code: KeyCode::End, ..
            } => app.follow = true,
            _ => {}
        }
    }
}

fn submit(manager: &Arc<Manager>, text: String, notices: &mpsc::UnboundedSender<String>) {
    let manager = Arc::clone(manager);
    let notices = notices.clone();
    tokio::spawn(async move {
        match manager.submit(&text).await {
            Ok(exchange) => {
                tracing::debug!(replies = exchange.replies.len(), outcome = ?exchange.outcome, "exchange finished");
            }
            Err(e) => {
                let _ = notices.send(e.to_string());
            }
        }
    });
}

fn request_gif(manager: &Arc<Manager>, notices: &mpsc::UnboundedSender<String>) {
    let Some(topic) = manager.latest_topic() else {
        let _ = notices.send("No mood to find a GIF for yet".to_string());
        return;
    };
    let manager = Arc::clone(manager);
    let notices = notices.clone();
    tokio::spawn(async move {
        let notice = match manager.request_alternate_media(&topic).await {
            Ok(MediaRefresh::Replaced { .. }) => format!("Found another {topic} GIF"),
            Ok(MediaRefresh::Unchanged) => "No other GIF available".to_string(),
            Ok(MediaRefresh::NoMedia) => "No GIF to replace".to_string(),
            Err(e) => e.to_string(),
        };
        let _ = notices.send(notice);
    });
}

fn show_history(manager: &Arc<Manager>, notices: &mpsc::UnboundedSender<String>) {
    let manager = Arc::clone(manager);
    let notices = notices.clone();
    tokio::spawn(async move {
        let records = manager.recent_history(5).await;
        let now = chrono::Utc::now();
        let notice = if records.is_empty() {
            "No mood history yet".to_string()
        } else {
            records
                .iter()
                .rev()
                .map(|r| format!("{} ({})", r.transition(), r.age_label(now)))
                .collect::<Vec<_>>()
                .join(" | ")
        };
        let _ = notices.send(notice);
    });
}

fn message_line(msg: &Message) -> Line<'_> {
    let (who, who_style) = match msg.role() {
        Role::User => ("You", Style::default().fg(Color::Cyan)),
        Role::Assistant => ("MoodMorph", Style::default().fg(Color::Magenta)),
        Role::System => ("System", Style::default().fg(Color::DarkGray)),
    };
    let time = msg.created_at().with_timezone(&chrono::Local).format("%H:%M");
    let body = match msg.body() {
        MessageBody::Text { text } => Span::styled(
            text.as_str(),
            if msg.kind() == MessageKind::Error {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            },
        ),
        MessageBody::Media { url, caption } => Span::styled(
            caption.as_ref().map_or_else(
                || format!("[GIF] {url}"),
                |c| format!("[GIF: {c}] {url}"),
            ),
            Style::default().add_modifier(Modifier::ITALIC),
        ),
    };
    Line::from(vec![
        Span::styled(format!("{time} "), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{who}: "), who_style.add_modifier(Modifier::BOLD)),
        body,
    ])
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let mut lines: Vec<Line> = Vec::with_capacity(app.messages.len() + 1);
    if let Some(greeting) = &app.greeting {
        lines.push(Line::styled(
            greeting.as_str(),
            Style::default().fg(Color::Green),
        ));
    }
    lines.extend(app.messages.iter().map(message_line));
    if app.busy {
        lines.push(Line::styled(
            "MoodMorph is typing...",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let visible = chunks[0].height.saturating_sub(2);
    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    let bottom = total.saturating_sub(visible);
    if app.follow || app.scroll > bottom {
        app.scroll = bottom;
    }

    let transcript = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("MoodMorph"))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    f.render_widget(transcript, chunks[0]);

    let meter_style = match app.meter() {
        InputMeter::Normal => Style::default().fg(Color::DarkGray),
        InputMeter::Warning => Style::default().fg(Color::Yellow),
        InputMeter::Danger | InputMeter::OverLimit => Style::default().fg(Color::Red),
    };
    let count = app.input.chars().count();
    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Message")
                .title_bottom(
                    Line::styled(format!("{count}/{}", app.max_input_chars), meter_style)
                        .right_aligned(),
                ),
        );
    f.render_widget(input, chunks[1]);

    let cursor = u16::try_from(count).unwrap_or(u16::MAX);
    f.set_cursor_position((
        chunks[1].x.saturating_add(cursor).saturating_add(1),
        chunks[1].y + 1,
    ));

    let mut status = vec![Span::raw(" ")];
    if let Some(notice) = &app.notice {
        status.push(Span::styled(notice.as_str(), Style::default().fg(Color::Yellow)));
        status.push(Span::raw(" | "));
    }
    if app.memory_only {
        status.push(Span::styled("history not saved", Style::default().fg(Color::Red)));
        status.push(Span::raw(" | "));
    }
    for (key, what) in [
        ("Enter", "send"),
        ("Ctrl+G", "another GIF"),
        ("Ctrl+R", "mood history"),
        ("Ctrl+K", "clear"),
        ("Esc", "stop"),
        ("Ctrl+C", "quit"),
    ] {
        status.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status.push(Span::raw(format!(" {what} ")));
    }
    f.render_widget(Paragraph::new(Line::from(status)), chunks[2]);
}
