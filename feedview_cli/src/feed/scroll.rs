//! Scroll anchoring: auto-follow vs detached viewing, and history triggers

use super::buffer::BufferStore;
use super::live::ConnectionState;

/// Viewing mode of the entry list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    /// The view follows newly arriving entries
    SnappedToBottom,
    /// The user scrolled away from the tail
    Detached,
}

/// Scroll geometry reported by the viewport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportSignal {
    pub at_top: bool,
    pub content_exceeds_viewport: bool,
}

/// Positioning capability of the viewport that renders the entries
pub trait Viewport {
    /// Show the newest entry and keep following the tail
    fn jump_to_bottom(&mut self);

    /// Bring the entry at `index` into view
    fn scroll_to_index(&mut self, index: usize);
}

/// Viewport for headless sessions
#[derive(Debug, Default)]
pub struct NullViewport;

impl Viewport for NullViewport {
    fn jump_to_bottom(&mut self) {}

    fn scroll_to_index(&mut self, _index: usize) {}
}

/// Tracks the anchor mode and whether the user is asking for history
#[derive(Debug)]
pub struct ScrollAnchor {
    mode: AnchorMode,
    wants_history: bool,
    content_exceeds_viewport: bool,
}

impl ScrollAnchor {
    pub fn new() -> Self {
        Self {
            mode: AnchorMode::SnappedToBottom,
            wants_history: false,
            content_exceeds_viewport: false,
        }
    }

    pub fn mode(&self) -> AnchorMode {
        self.mode
    }

    pub fn is_snapped(&self) -> bool {
        self.mode == AnchorMode::SnappedToBottom
    }

    /// The "may need more history" flag
    #[cfg(test)]
    pub fn wants_history(&self) -> bool {
        self.wants_history
    }

    /// The viewport reported the user left the tail
    pub fn snap_broken(&mut self) -> bool {
        let changed = self.mode == AnchorMode::SnappedToBottom;
        self.mode = AnchorMode::Detached;
        changed
    }

    /// The user asked to go live again
    pub fn snap_to_bottom(&mut self) {
        self.mode = AnchorMode::SnappedToBottom;
    }

    /// Apply a scroll position report
    ///
    /// Leaving the top clears the "no more older data" flag so that coming back
    /// retries the backfill.
    pub fn on_scroll(&mut self, signal: ViewportSignal, buffer: &mut BufferStore) {
        self.content_exceeds_viewport = signal.content_exceeds_viewport;
        if signal.at_top {
            self.wants_history = true;
        } else {
            self.wants_history = false;
            buffer.set_no_more_older(false);
        }
    }

    /// Record geometry without treating it as a scroll
    pub fn on_resize(&mut self, content_exceeds_viewport: bool) {
        self.content_exceeds_viewport = content_exceeds_viewport;
    }

    /// A backfill has been started for the current request
    pub fn history_requested(&mut self) {
        self.wants_history = false;
    }

    /// Backfill only runs while the live feed is not streaming
    pub fn should_backfill(&self, connection: ConnectionState, no_more_older: bool) -> bool {
        self.wants_history && connection == ConnectionState::Disconnected && !no_more_older
    }

    /// Whether the "fetch old records" affordance is shown
    pub fn load_older_visible(&self, top_cursor: Option<&str>) -> bool {
        !self.content_exceeds_viewport && top_cursor.is_some_and(|c| !c.is_empty())
    }

    /// Whether the "go live" affordance is shown
    pub fn go_live_visible(&self, connection: ConnectionState) -> bool {
        !(self.is_snapped() && connection == ConnectionState::Connected)
    }
}

impl Default for ScrollAnchor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AT_TOP: ViewportSignal = ViewportSignal {
        at_top: true,
        content_exceeds_viewport: true,
    };
    const MIDDLE: ViewportSignal = ViewportSignal {
        at_top: false,
        content_exceeds_viewport: true,
    };

    #[test]
    fn test_snap_state_machine() {
        let mut anchor = ScrollAnchor::new();
        assert_eq!(anchor.mode(), AnchorMode::SnappedToBottom);

        assert!(anchor.snap_broken());
        assert!(!anchor.snap_broken());
        assert_eq!(anchor.mode(), AnchorMode::Detached);

        anchor.snap_to_bottom();
        assert!(anchor.is_snapped());
    }

    #[test]
    fn test_backfill_trigger_requires_disconnected() {
        let mut buffer = BufferStore::new(10);
        let mut anchor = ScrollAnchor::new();

        anchor.on_scroll(AT_TOP, &mut buffer);
        assert!(anchor.wants_history());
        assert!(!anchor.should_backfill(ConnectionState::Connected, false));
        assert!(anchor.should_backfill(ConnectionState::Disconnected, false));
        assert!(!anchor.should_backfill(ConnectionState::Disconnected, true));

        anchor.history_requested();
        assert!(!anchor.should_backfill(ConnectionState::Disconnected, false));
    }

    #[test]
    fn test_scrolling_away_clears_flags() {
        let mut buffer = BufferStore::new(10);
        buffer.set_no_more_older(true);
        let mut anchor = ScrollAnchor::new();

        anchor.on_scroll(AT_TOP, &mut buffer);
        assert!(buffer.no_more_older());

        anchor.on_scroll(MIDDLE, &mut buffer);
        assert!(!anchor.wants_history());
        assert!(!buffer.no_more_older());
    }

    #[test]
    fn test_affordance_visibility() {
        let mut buffer = BufferStore::new(10);
        let mut anchor = ScrollAnchor::new();

        assert!(!anchor.load_older_visible(None));
        assert!(anchor.load_older_visible(Some("17")));
        assert!(!anchor.load_older_visible(Some("")));

        anchor.on_scroll(MIDDLE, &mut buffer);
        assert!(!anchor.load_older_visible(Some("17")));

        assert!(!anchor.go_live_visible(ConnectionState::Connected));
        assert!(anchor.go_live_visible(ConnectionState::Disconnected));
        anchor.snap_broken();
        assert!(anchor.go_live_visible(ConnectionState::Connected));
    }
}
