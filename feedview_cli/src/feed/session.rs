//! Feed session: the single owner of buffer, cursors, connection and focus
//!
//! Every public method is one run-to-completion step triggered by an event
//! (push message, finished backfill, viewport signal or user action). The
//! dispatch loop calls them one at a time, so no two steps ever touch the
//! buffer concurrently.

use super::backfill::{merge_page, BackfillPage, BackfillRequest, SingleFlight};
use super::buffer::{AppendOutcome, BufferStore, EvictionSide};
use super::focus::FocusTracker;
use super::live::{ConnectionState, LiveEvent, LiveRequest};
use super::scroll::{AnchorMode, ScrollAnchor, Viewport, ViewportSignal};
use super::transport::{FeedEvent, FeedTransport};
use feedview_common::{constants, Entry, EntryKey, FeedError};
use tokio::sync::broadcast;

/// Tunables of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub max_entries: usize,
    pub page_limit: u32,
    pub fetch_timeout_ms: u64,
    pub initial_fetch_limit: u32,
    pub initial_fetch_timeout_ms: u64,
}

impl FeedSettings {
    pub fn new(max_entries: usize) -> Result<Self, FeedError> {
        if max_entries == 0 {
            return Err(FeedError::InvalidCapacity);
        }
        Ok(Self {
            max_entries,
            ..Self::default()
        })
    }

    /// Reject settings a session cannot run with
    ///
    /// The backfill timeout is the only thing that ends a hung request, so it
    /// must be non-zero.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.max_entries == 0 {
            return Err(FeedError::InvalidCapacity);
        }
        if self.fetch_timeout_ms == 0 {
            return Err(FeedError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            max_entries: constants::MAX_ENTRIES,
            page_limit: constants::BACKFILL_PAGE_LIMIT,
            fetch_timeout_ms: constants::BACKFILL_TIMEOUT_MS,
            initial_fetch_limit: constants::BACKFILL_PAGE_LIMIT,
            initial_fetch_timeout_ms: constants::BACKFILL_TIMEOUT_MS,
        }
    }
}

/// Change notifications broadcast to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Appended(EntryKey),
    Prepended { count: usize },
    /// Entries silently left the window because of the cap
    Evicted { side: EvictionSide, count: usize },
    Reset,
    Connection(ConnectionState),
    Focus(EntryKey),
}

/// Read-only view of session state for collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub len: usize,
    pub max_entries: usize,
    pub connection: ConnectionState,
    pub mode: AnchorMode,
    pub no_more_older: bool,
    pub loading_older: bool,
    pub queried_total: u64,
    pub truncated_timestamp: i64,
    pub top_cursor: Option<String>,
    pub bottom_cursor: String,
    pub focused: Option<EntryKey>,
    /// The focused entry has been evicted from the window
    pub focus_evicted: bool,
    pub load_older_visible: bool,
    pub go_live_visible: bool,
}

impl FeedSnapshot {
    /// Capture time of the earliest known entry, 0 when unknown
    pub fn first_entry_time(&self, head: Option<&Entry>) -> i64 {
        if self.truncated_timestamp != 0 {
            self.truncated_timestamp
        } else {
            head.map(|e| e.timestamp).unwrap_or(0)
        }
    }
}

/// A viewing session over one query
pub struct FeedSession<T: FeedTransport> {
    settings: FeedSettings,
    query: String,
    buffer: BufferStore,
    connection: ConnectionState,
    active_live: Option<u64>,
    next_generation: u64,
    epoch: u64,
    anchor: ScrollAnchor,
    focus: FocusTracker,
    backfill: SingleFlight,
    queried_total: u64,
    truncated_timestamp: i64,
    transport: T,
    updates: broadcast::Sender<FeedUpdate>,
}

impl<T: FeedTransport> FeedSession<T> {
    pub fn new(settings: FeedSettings, query: impl Into<String>, transport: T) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            buffer: BufferStore::new(settings.max_entries),
            settings,
            query: query.into(),
            connection: ConnectionState::Disconnected,
            active_live: None,
            next_generation: 0,
            epoch: 0,
            anchor: ScrollAnchor::new(),
            focus: FocusTracker::new(),
            backfill: SingleFlight::new(),
            queried_total: 0,
            truncated_timestamp: 0,
            transport,
            updates,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    pub fn buffer(&self) -> &BufferStore {
        &self.buffer
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn focused_entry(&self) -> Option<&Entry> {
        self.focus.focused().and_then(|key| self.buffer.find(key))
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            len: self.buffer.len(),
            max_entries: self.buffer.max_entries(),
            connection: self.connection,
            mode: self.anchor.mode(),
            no_more_older: self.buffer.no_more_older(),
            loading_older: self.backfill.is_in_flight(),
            queried_total: self.queried_total,
            truncated_timestamp: self.truncated_timestamp,
            top_cursor: self.buffer.top_cursor().map(str::to_string),
            bottom_cursor: self.buffer.bottom_cursor(),
            focused: self.focus.focused().cloned(),
            focus_evicted: self.focus.is_stale(&self.buffer),
            load_older_visible: self.anchor.load_older_visible(self.buffer.top_cursor()),
            go_live_visible: self.anchor.go_live_visible(self.connection),
        }
    }

    /// Begin tailing the most recent entries with a fresh buffer
    pub fn start(&mut self) {
        self.open_live(
            constants::LIVE_CURSOR.to_string(),
            true,
            self.settings.initial_fetch_limit,
            self.settings.initial_fetch_timeout_ms,
        );
    }

    /// Replace the query; the old view is discarded
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.close_live();
        self.query = query.into();
        self.anchor.snap_to_bottom();
        self.start();
    }

    /// Apply one inbound event
    pub fn handle(&mut self, event: FeedEvent, viewport: &mut dyn Viewport) {
        match event {
            FeedEvent::Live { generation, event } => self.on_live(generation, event),
            FeedEvent::Backfill { epoch, result } => self.on_backfill(epoch, result, viewport),
        }
        self.maybe_backfill();
    }

    /// The viewport reported a scroll position
    pub fn on_viewport(&mut self, signal: ViewportSignal) {
        self.anchor.on_scroll(signal, &mut self.buffer);
        self.maybe_backfill();
    }

    /// The viewport geometry changed without a scroll
    pub fn on_resize(&mut self, content_exceeds_viewport: bool) {
        self.anchor.on_resize(content_exceeds_viewport);
    }

    /// The user scrolled away from the tail: stop following and pause the live feed
    pub fn snap_broken(&mut self) {
        if self.anchor.snap_broken() {
            tracing::debug!("Snap to bottom broken");
            self.close_live();
        }
    }

    /// Resume live tailing from the newest retained entry
    pub fn go_live(&mut self, viewport: &mut dyn Viewport) {
        let from_cursor = self.buffer.bottom_cursor();
        self.close_live();
        self.open_live(from_cursor, false, 0, 0);
        viewport.jump_to_bottom();
        self.anchor.snap_to_bottom();
    }

    /// Explicit "fetch old records" action; pauses the live feed like a broken snap
    pub fn load_older(&mut self) -> Result<(), FeedError> {
        self.anchor.snap_broken();
        self.close_live();
        self.request_backfill()
    }

    /// Focus an entry chosen by the user
    pub fn select(&mut self, key: EntryKey) -> bool {
        if !self.buffer.contains(&key) {
            return false;
        }
        self.focus.select(key.clone());
        self.notify(FeedUpdate::Focus(key));
        true
    }

    fn open_live(&mut self, from_cursor: String, reset: bool, fetch: u32, timeout_ms: u64) {
        if reset {
            self.reset_buffer();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.active_live = Some(generation);

        self.transport.open_live(LiveRequest {
            generation,
            from_cursor,
            query: self.query.clone(),
            initial_fetch_limit: fetch,
            initial_fetch_timeout_ms: timeout_ms,
        });
        self.set_connection(ConnectionState::Connected);
    }

    fn close_live(&mut self) {
        if self.active_live.take().is_some() {
            self.transport.close_live();
        }
        self.set_connection(ConnectionState::Disconnected);
    }

    fn reset_buffer(&mut self) {
        self.buffer.reset();
        self.epoch += 1;
        self.queried_total = 0;
        self.truncated_timestamp = 0;
        self.focus.on_buffer_changed(&self.buffer);
        self.notify(FeedUpdate::Reset);
    }

    fn on_live(&mut self, generation: u64, event: LiveEvent) {
        if self.active_live != Some(generation) {
            tracing::debug!("Ignoring event from closed live feed #{}", generation);
            return;
        }

        match event {
            LiveEvent::Entry(entry) => {
                let key = entry.key();
                if let AppendOutcome::Inserted { evicted } = self.buffer.append_tail(entry) {
                    self.notify(FeedUpdate::Appended(key));
                    if evicted > 0 {
                        self.notify(FeedUpdate::Evicted {
                            side: EvictionSide::Head,
                            count: evicted,
                        });
                    }
                    self.observe_focus();
                }
            }
            LiveEvent::Closed => {
                tracing::debug!("Live feed #{} closed by transport", generation);
                self.active_live = None;
                self.set_connection(ConnectionState::Disconnected);
            }
        }
    }

    fn on_backfill(
        &mut self,
        epoch: u64,
        result: Result<BackfillPage, FeedError>,
        viewport: &mut dyn Viewport,
    ) {
        self.backfill.finish();

        if epoch != self.epoch {
            tracing::debug!("Discarding backfill from a previous view");
            return;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("{}", e);
                self.buffer.set_no_more_older(true);
                return;
            }
        };

        self.queried_total = page.meta.total;
        self.truncated_timestamp = page.meta.truncated_timestamp;

        let merge = merge_page(&mut self.buffer, page);
        if merge.outcome.inserted > 0 {
            self.notify(FeedUpdate::Prepended {
                count: merge.outcome.inserted,
            });
        }
        if merge.outcome.evicted > 0 {
            self.notify(FeedUpdate::Evicted {
                side: EvictionSide::Tail,
                count: merge.outcome.evicted,
            });
        }
        self.observe_focus();

        if let Some(index) = merge.scroll_to {
            viewport.scroll_to_index(index);
        }
    }

    fn maybe_backfill(&mut self) {
        if !self
            .anchor
            .should_backfill(self.connection, self.buffer.no_more_older())
        {
            return;
        }
        if let Err(e) = self.request_backfill() {
            tracing::debug!("Backfill not started: {}", e);
        }
    }

    fn request_backfill(&mut self) -> Result<(), FeedError> {
        // Consumed even when no request goes out; the next top-of-view report re-arms it
        self.anchor.history_requested();

        let cursor = match self.buffer.top_cursor() {
            Some(cursor) if !cursor.is_empty() => cursor.to_string(),
            _ => return Err(FeedError::MissingCursor),
        };
        self.backfill.try_begin()?;

        self.transport.fetch_older(BackfillRequest {
            epoch: self.epoch,
            cursor,
            query: self.query.clone(),
            limit: self.settings.page_limit,
            timeout_ms: self.settings.fetch_timeout_ms,
        });
        Ok(())
    }

    fn observe_focus(&mut self) {
        if self.focus.on_buffer_changed(&self.buffer) {
            if let Some(key) = self.focus.focused().cloned() {
                self.notify(FeedUpdate::Focus(key));
            }
        }
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            self.connection = state;
            self.notify(FeedUpdate::Connection(state));
        }
    }

    fn notify(&self, update: FeedUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}
