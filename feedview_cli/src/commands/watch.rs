//! Watch command: tail captured traffic

use crate::config::Config;
use crate::feed::{
    ConnectionState, FeedEvent, FeedSession, FeedTransport, FeedUpdate, NetworkTransport,
    NullViewport, Viewport, EVENT_CHANNEL_CAPACITY,
};
use crate::tui::{self, TuiApp, UserAction};
use anyhow::Result;
use console::style;
use crossterm::{
    cursor,
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use feedview_common::Entry;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Options for the watch command
pub struct WatchOptions {
    pub query: String,
    pub no_tui: bool,
}

/// Run the watch command
pub async fn run(config: Config, opts: WatchOptions) -> Result<()> {
    let settings = config.feed_settings()?;
    let (events_tx, events_rx) = mpsc::channel::<FeedEvent>(EVENT_CHANNEL_CAPACITY);
    let transport = NetworkTransport::new(&config.server_url, &config.websocket_url(), events_tx)?;
    let mut session = FeedSession::new(settings, opts.query.clone(), transport);

    tracing::info!("Watching {} (query {:?})", config.server_url, opts.query);

    if opts.no_tui {
        return run_plain(&mut session, events_rx).await;
    }

    let mut app = TuiApp::new(config.server_url.clone(), opts.query);

    // Setup terminal; everything after raw mode restores it, even when setup fails
    enable_raw_mode()?;
    restoring(run_in_terminal(&mut app, &mut session, events_rx), restore_terminal).await
}

/// Run `body`, then `restore` whatever the outcome; the body's error wins
async fn restoring<F, R>(body: F, restore: R) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
    R: FnOnce() -> Result<()>,
{
    let result = body.await;
    let restored = restore();
    result.and(restored)
}

async fn run_in_terminal<T: FeedTransport>(
    app: &mut TuiApp,
    session: &mut FeedSession<T>,
    events_rx: mpsc::Receiver<FeedEvent>,
) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    session.start();
    run_tui_loop(&mut terminal, app, session, events_rx).await
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, cursor::Show)?;
    Ok(())
}

async fn run_tui_loop<T: FeedTransport>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    session: &mut FeedSession<T>,
    mut events_rx: mpsc::Receiver<FeedEvent>,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        // Draw UI
        terminal.draw(|f| tui::draw(f, app, session))?;
        session.on_resize(app.content_exceeds_viewport());

        tokio::select! {
            // Handle keyboard events (non-blocking)
            _ = tick_interval.tick() => {
                while event::poll(Duration::from_millis(0))? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if let Some(action) = app.handle_key(key) {
                            apply_action(session, app, action);
                        }
                        if app.should_quit {
                            return Ok(());
                        }
                    }
                }
            }

            // Live entries and finished backfills
            Some(event) = events_rx.recv() => {
                session.handle(event, app);
                app.sync(session.buffer().len());
            }
        }
    }
}

/// Forward a user action to the session
pub(crate) fn apply_action<T: FeedTransport>(
    session: &mut FeedSession<T>,
    app: &mut TuiApp,
    action: UserAction,
) {
    match action {
        UserAction::Scrolled { left_tail } => {
            if left_tail {
                session.snap_broken();
            }
            session.on_viewport(app.signal());
        }
        UserAction::GoLive => {
            session.go_live(app);
        }
        UserAction::LoadOlder => {
            if !session.snapshot().load_older_visible {
                return;
            }
            if let Err(e) = session.load_older() {
                tracing::debug!("Fetch old records skipped: {}", e);
            }
        }
        UserAction::Focus(index) => {
            if let Some(key) = session.buffer().get(index).map(Entry::key) {
                session.select(key);
            }
        }
        UserAction::SetQuery(query) => {
            tracing::info!("Query changed to {:?}", query);
            app.query = query.clone();
            session.set_query(query);
            app.jump_to_bottom();
            app.sync(session.buffer().len());
        }
    }
}

/// Print appended entries until the live feed closes or the user interrupts
async fn run_plain<T: FeedTransport>(
    session: &mut FeedSession<T>,
    mut events_rx: mpsc::Receiver<FeedEvent>,
) -> Result<()> {
    let mut updates = session.subscribe();
    session.start();

    println!(
        "{} {} {}",
        style(" feedview ").on_cyan().black(),
        style("Watching").dim(),
        style(session.query()).magenta()
    );

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                session.handle(event, &mut NullViewport);
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }

        loop {
            match updates.try_recv() {
                Ok(FeedUpdate::Appended(key)) => {
                    if let Some(entry) = session.buffer().find(&key) {
                        println!("{}", format_entry_line(entry));
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {} feed updates", n);
                }
                Err(_) => break,
            }
        }

        if session.connection() == ConnectionState::Disconnected {
            println!("{}", style("Live feed closed").yellow());
            return Ok(());
        }
    }
}

/// One plain-mode output line
fn format_entry_line(entry: &Entry) -> String {
    format!(
        "{} {} {} {}",
        style(tui::format_time(entry.timestamp)).dim(),
        style(&entry.worker).cyan(),
        style(&entry.id).white(),
        entry.summary()
    )
}
