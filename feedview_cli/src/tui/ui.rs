//! TUI rendering functions

use super::app::TuiApp;
use crate::feed::{AnchorMode, ConnectionState, FeedSession, FeedSnapshot, FeedTransport};
use chrono::{DateTime, Utc};
use feedview_common::Entry;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState, Table, TableState, Wrap},
    Frame,
};

/// Draw the TUI
pub fn draw<T: FeedTransport>(frame: &mut Frame, app: &mut TuiApp, session: &FeedSession<T>) {
    let snapshot = session.snapshot();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title bar
            Constraint::Length(1), // History status
            Constraint::Min(5),    // Entries + detail
            Constraint::Length(1), // Counts
            Constraint::Length(1), // Key hints
        ])
        .split(frame.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[2]);

    // Borders and table header take three rows
    app.list_height = (body[0].height as usize).saturating_sub(3).max(1);
    app.sync(session.buffer().len());

    draw_title_bar(frame, app, &snapshot, chunks[0]);
    draw_history_status(frame, &snapshot, chunks[1]);
    draw_entries(frame, app, session, &snapshot, body[0]);
    draw_detail(frame, session.focused_entry(), snapshot.focus_evicted, body[1]);
    draw_counts(frame, &snapshot, session.buffer().head(), chunks[3]);
    draw_footer(frame, app, &snapshot, chunks[4]);
}

/// Draw the title bar with server, query and live status
fn draw_title_bar(frame: &mut Frame, app: &TuiApp, snapshot: &FeedSnapshot, area: Rect) {
    let status_color = match snapshot.connection {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Disconnected => Color::Red,
    };
    let mode = match snapshot.mode {
        AnchorMode::SnappedToBottom => "LIVE",
        AnchorMode::Detached => "PAUSED",
    };
    let query_span = match &app.query_input {
        Some(input) => Span::styled(
            format!("{}_", truncate_str(input, 60)),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        None if app.query.is_empty() => Span::styled("(all traffic)", Style::default().fg(Color::Magenta)),
        None => Span::styled(truncate_str(&app.query, 60), Style::default().fg(Color::Magenta)),
    };

    let line = Line::from(vec![
        Span::styled(" FEEDVIEW ", Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(truncate_str(&app.server_url, 40), Style::default().fg(Color::White)),
        Span::styled("  query ", Style::default().fg(Color::DarkGray)),
        query_span,
        Span::styled("  ● ", Style::default().fg(status_color)),
        Span::styled(snapshot.connection.as_str(), Style::default().fg(status_color)),
        Span::styled(format!("  [{}]", mode), Style::default().fg(Color::Yellow)),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Loading indicator or end-of-history marker
fn draw_history_status(frame: &mut Frame, snapshot: &FeedSnapshot, area: Rect) {
    let line = if snapshot.loading_older {
        Line::from(Span::styled("  Loading older entries...", Style::default().fg(Color::Cyan)))
    } else if snapshot.no_more_older {
        Line::from(Span::styled("  No more data available", Style::default().fg(Color::DarkGray)))
    } else {
        Line::from("")
    };

    frame.render_widget(Paragraph::new(line), area);
}

/// Draw the entry table with scrolling and scrollbar
fn draw_entries<T: FeedTransport>(
    frame: &mut Frame,
    app: &TuiApp,
    session: &FeedSession<T>,
    snapshot: &FeedSnapshot,
    area: Rect,
) {
    let buffer = session.buffer();

    let header = Row::new(vec!["Time", "Worker", "Id", "Summary"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .bottom_margin(0);

    let rows: Vec<Row> = buffer
        .entries()
        .iter()
        .skip(app.scroll_offset)
        .take(app.list_height)
        .map(|entry| {
            let focused = snapshot.focused.as_ref().is_some_and(|key| entry.has_key(key));
            let id_style = if focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            Row::new(vec![
                Cell::from(format_time(entry.timestamp)),
                Cell::from(truncate_str(&entry.worker, 16)).style(Style::default().fg(Color::Cyan)),
                Cell::from(truncate_str(&entry.id, 12)).style(id_style),
                Cell::from(entry.summary()).style(summary_style(entry)),
            ])
        })
        .collect();

    // Split area to leave room for scrollbar
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(16),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(" Traffic ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
    .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let mut state = TableState::default();
    if !buffer.is_empty() {
        state.select(Some(app.selected_index.saturating_sub(app.scroll_offset)));
    }

    frame.render_stateful_widget(table, chunks[0], &mut state);

    if app.content_exceeds_viewport() {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");

        let mut scrollbar_state = ScrollbarState::new(buffer.len()).position(app.selected_index);
        frame.render_stateful_widget(scrollbar, chunks[1], &mut scrollbar_state);
    }
}

/// Draw the focused entry as pretty JSON
fn draw_detail(frame: &mut Frame, entry: Option<&Entry>, evicted: bool, area: Rect) {
    let text = match entry {
        Some(entry) => serde_json::to_string_pretty(entry).unwrap_or_default(),
        None if evicted => "Focused entry is no longer retained".to_string(),
        None => "No entry focused".to_string(),
    };

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(" Entry ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(paragraph, area);
}

/// Displayed vs total counts and the earliest known capture time
fn draw_counts(frame: &mut Frame, snapshot: &FeedSnapshot, head: Option<&Entry>, area: Rect) {
    let mut spans = vec![
        Span::styled(" Displaying ", Style::default().fg(Color::DarkGray)),
        Span::styled(snapshot.len.to_string(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::styled(" results out of ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            snapshot.queried_total.to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" total", Style::default().fg(Color::DarkGray)),
        Span::styled(format!(" (window {})", snapshot.max_entries), Style::default().fg(Color::DarkGray)),
    ];

    let first = snapshot.first_entry_time(head);
    if first != 0 {
        spans.push(Span::styled("   First traffic entry time ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(format_full_time(first), Style::default().fg(Color::White)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw the footer with key hints
fn draw_footer(frame: &mut Frame, app: &TuiApp, snapshot: &FeedSnapshot, area: Rect) {
    if app.query_input.is_some() {
        let line = Line::from(vec![
            Span::styled(" Enter", Style::default().fg(Color::Cyan)),
            Span::styled(" Apply query  ", Style::default().fg(Color::DarkGray)),
            Span::styled("Esc", Style::default().fg(Color::Cyan)),
            Span::styled(" Cancel", Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let mut spans = vec![
        Span::styled(" ↑/↓", Style::default().fg(Color::Cyan)),
        Span::styled(" Navigate  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Cyan)),
        Span::styled(" Focus  ", Style::default().fg(Color::DarkGray)),
    ];

    if snapshot.go_live_visible {
        spans.push(Span::styled("l", Style::default().fg(Color::Cyan)));
        spans.push(Span::styled(" Snap to bottom  ", Style::default().fg(Color::DarkGray)));
    }
    if snapshot.load_older_visible {
        spans.push(Span::styled("o", Style::default().fg(Color::Cyan)));
        spans.push(Span::styled(" Fetch old records  ", Style::default().fg(Color::DarkGray)));
    }

    spans.push(Span::styled("/", Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(" Query  ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled("q", Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(" Quit", Style::default().fg(Color::DarkGray)));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Colour by response status when the payload carries one
fn summary_style(entry: &Entry) -> Style {
    let status = entry.payload.get("status").and_then(|v| v.as_u64()).unwrap_or(0);
    if status >= 500 {
        Style::default().fg(Color::Red)
    } else if status >= 400 {
        Style::default().fg(Color::Yellow)
    } else if status >= 300 {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    }
}

fn to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Format a capture time for table rows
pub(crate) fn format_time(ms: i64) -> String {
    to_datetime(ms)
        .map(|t| t.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format a capture time with its date
pub(crate) fn format_full_time(ms: i64) -> String {
    to_datetime(ms)
        .map(|t| t.format("%m/%d/%Y, %-I:%M:%S%.3f %p").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Truncate any string to max length
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max_len).collect()
    }
}
