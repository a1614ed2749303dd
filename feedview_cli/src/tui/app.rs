//! TUI application state and key handling
//!
//! The entry list is the viewport collaborator of the feed session: it turns
//! key presses into scroll signals and applies the session's positioning
//! requests.

use crate::feed::{Viewport, ViewportSignal};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Actions the dispatch loop forwards to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// The cursor moved; `left_tail` is set the first time it moves away from the tail
    Scrolled { left_tail: bool },
    /// Snap to bottom and resume the live feed
    GoLive,
    /// Fetch old records
    LoadOlder,
    /// Focus the entry at this index
    Focus(usize),
    /// Replace the query; the view starts over
    SetQuery(String),
}

/// TUI application state
pub struct TuiApp {
    pub server_url: String,
    pub query: String,
    pub selected_index: usize,
    pub scroll_offset: usize,
    /// Rows available for entries, updated on every draw
    pub list_height: usize,
    /// The list follows the tail
    pub following: bool,
    pub should_quit: bool,
    /// Query being typed, while the query prompt is open
    pub query_input: Option<String>,
    len: usize,
}

impl TuiApp {
    pub fn new(server_url: String, query: String) -> Self {
        Self {
            server_url,
            query,
            selected_index: 0,
            scroll_offset: 0,
            list_height: 1,
            following: true,
            should_quit: false,
            query_input: None,
            len: 0,
        }
    }

    /// Reconcile cursor and offset with the current number of entries
    pub fn sync(&mut self, len: usize) {
        self.len = len;
        let height = self.list_height.max(1);

        if len == 0 {
            self.selected_index = 0;
            self.scroll_offset = 0;
            return;
        }

        if self.following {
            self.selected_index = len - 1;
            self.scroll_offset = len.saturating_sub(height);
            return;
        }

        self.selected_index = self.selected_index.min(len - 1);
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + height {
            self.scroll_offset = self.selected_index + 1 - height;
        }
        self.scroll_offset = self.scroll_offset.min(len.saturating_sub(height));
    }

    pub fn content_exceeds_viewport(&self) -> bool {
        self.len > self.list_height
    }

    /// Scroll geometry for the session
    pub fn signal(&self) -> ViewportSignal {
        ViewportSignal {
            at_top: self.scroll_offset == 0,
            content_exceeds_viewport: self.content_exceeds_viewport(),
        }
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<UserAction> {
        if self.query_input.is_some() {
            return self.handle_query_key(key);
        }

        let last = self.len.saturating_sub(1);
        let page = self.list_height.max(1);

        let target = match (key.code, key.modifiers) {
            // Quit
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) => {
                self.should_quit = true;
                return None;
            }
            (KeyCode::Char('l'), _) => return Some(UserAction::GoLive),
            (KeyCode::Char('o'), _) => return Some(UserAction::LoadOlder),
            (KeyCode::Char('/'), _) => {
                self.query_input = Some(self.query.clone());
                return None;
            }
            (KeyCode::Enter, _) if self.len > 0 => {
                return Some(UserAction::Focus(self.selected_index));
            }
            // Navigation
            (KeyCode::Up | KeyCode::Char('k'), _) => self.selected_index.saturating_sub(1),
            (KeyCode::Down | KeyCode::Char('j'), _) => (self.selected_index + 1).min(last),
            (KeyCode::PageUp, _) => self.selected_index.saturating_sub(page),
            (KeyCode::PageDown, _) => (self.selected_index + page).min(last),
            (KeyCode::Home, _) => 0,
            (KeyCode::End, _) => last,
            _ => return None,
        };

        Some(self.move_cursor(target))
    }

    fn handle_query_key(&mut self, key: KeyEvent) -> Option<UserAction> {
        let input = self.query_input.as_mut()?;

        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                self.should_quit = true;
                None
            }
            (KeyCode::Esc, _) => {
                self.query_input = None;
                None
            }
            (KeyCode::Enter, _) => {
                let query = input.trim().to_string();
                self.query_input = None;
                if query == self.query {
                    return None;
                }
                Some(UserAction::SetQuery(query))
            }
            (KeyCode::Backspace, _) => {
                input.pop();
                None
            }
            (KeyCode::Char(c), _) => {
                input.push(c);
                None
            }
            _ => None,
        }
    }

    fn move_cursor(&mut self, target: usize) -> UserAction {
        let left_tail = self.following && target < self.len.saturating_sub(1);
        if left_tail {
            self.following = false;
        }
        self.selected_index = target;
        self.sync(self.len);
        UserAction::Scrolled { left_tail }
    }
}

impl Viewport for TuiApp {
    fn jump_to_bottom(&mut self) {
        self.following = true;
        self.sync(self.len);
    }

    fn scroll_to_index(&mut self, index: usize) {
        self.following = false;
        self.selected_index = index;
        self.scroll_offset = index;
    }
}
